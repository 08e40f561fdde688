//! Step gating
//!
//! A step runs when every one of its conditions holds. A condition holds when
//! its variable is bound to a non-empty value and, if a pattern is given, the
//! value matches it case-insensitively. Steps flagged
//! `only_if_previous_messages` never run on the first turn of a chat.

use regex::{Regex, RegexBuilder};

use chat_core::agent::{Condition, StepDefinition};

use crate::context::ExecutionContext;
use crate::error::{Result, RunnerError};

/// A condition with its pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    variable: String,
    pattern: Option<Regex>,
}

impl CompiledCondition {
    pub fn compile(condition: &Condition) -> Result<Self> {
        let pattern = match condition.regex.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        RunnerError::definition(format!(
                            "invalid regex {:?} on variable {:?}: {}",
                            raw, condition.variable, e
                        ))
                    })?,
            ),
            _ => None,
        };

        Ok(Self {
            variable: condition.variable.clone(),
            pattern,
        })
    }

    pub fn holds(&self, context: &ExecutionContext) -> bool {
        match context.get(&self.variable) {
            Some(value) if !value.is_empty() => self
                .pattern
                .as_ref()
                .map_or(true, |pattern| pattern.is_match(value)),
            _ => false,
        }
    }
}

/// All gating rules of one step
#[derive(Debug, Clone, Default)]
pub struct Gate {
    only_if_previous_messages: bool,
    conditions: Vec<CompiledCondition>,
}

impl Gate {
    pub fn from_step(step: &StepDefinition) -> Result<Self> {
        let conditions = step
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            only_if_previous_messages: step.only_if_previous_messages,
            conditions,
        })
    }

    pub fn should_run(&self, context: &ExecutionContext, history_non_empty: bool) -> bool {
        if self.only_if_previous_messages && !history_non_empty {
            return false;
        }
        self.conditions.iter().all(|c| c.holds(context))
    }
}

/// Decide whether `step` runs against `context`
pub fn should_run(
    step: &StepDefinition,
    context: &ExecutionContext,
    history_non_empty: bool,
) -> Result<bool> {
    Ok(Gate::from_step(step)?.should_run(context, history_non_empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> StepDefinition {
        StepDefinition::new("refund", "sys", "{prompt}")
    }

    fn ctx_with_topic(topic: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("hello", Vec::new());
        ctx.record("topic", topic);
        ctx
    }

    #[test]
    fn test_unconditional_step_runs() {
        let ctx = ExecutionContext::new("hello", Vec::new());
        assert!(should_run(&step(), &ctx, false).unwrap());
    }

    #[test]
    fn test_regex_miss_skips() {
        let step = step().with_condition(Condition::matching("topic", "refund"));
        let ctx = ctx_with_topic("billing question");
        assert!(!should_run(&step, &ctx, true).unwrap());
    }

    #[test]
    fn test_regex_is_case_insensitive_search() {
        let step = step().with_condition(Condition::matching("topic", "refund"));
        let ctx = ctx_with_topic("Customer wants a REFUND now");
        assert!(should_run(&step, &ctx, false).unwrap());
    }

    #[test]
    fn test_presence_condition() {
        let step = step().with_condition(Condition::present("topic"));
        assert!(should_run(&step, &ctx_with_topic("x"), false).unwrap());
        assert!(!should_run(&step, &ctx_with_topic(""), false).unwrap());

        let empty = ExecutionContext::new("hello", Vec::new());
        assert!(!should_run(&step, &empty, false).unwrap());
    }

    #[test]
    fn test_blank_regex_means_presence() {
        let step = step().with_condition(Condition::matching("topic", "  "));
        assert!(should_run(&step, &ctx_with_topic("anything"), false).unwrap());
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let step = step()
            .with_condition(Condition::matching("prompt", "hel+o"))
            .with_condition(Condition::matching("topic", "refund"));
        assert!(!should_run(&step, &ctx_with_topic("billing"), false).unwrap());
        assert!(should_run(&step, &ctx_with_topic("refund"), false).unwrap());
    }

    #[test]
    fn test_only_if_previous_messages_on_new_chat() {
        let step = step().only_if_previous_messages();
        let ctx = ExecutionContext::new("hello", Vec::new());
        assert!(!should_run(&step, &ctx, false).unwrap());
        assert!(should_run(&step, &ctx, true).unwrap());
    }

    #[test]
    fn test_only_if_previous_messages_ignores_conditions() {
        let step = step()
            .only_if_previous_messages()
            .with_condition(Condition::present("prompt"));
        let ctx = ExecutionContext::new("hello", Vec::new());
        assert!(!should_run(&step, &ctx, false).unwrap());
    }

    #[test]
    fn test_invalid_regex_is_definition_error() {
        let step = step().with_condition(Condition::matching("topic", "(unclosed"));
        let result = should_run(&step, &ctx_with_topic("x"), false);
        assert!(matches!(result, Err(RunnerError::Definition { .. })));
    }
}
