//! Step compiler
//!
//! Turns an [`AgentDefinition`] into an [`ExecutionPlan`]: one conditional
//! unit per step except the last, followed by a final unit that always runs.
//! Compilation is pure; it validates the definition and pre-compiles condition
//! patterns but never touches the model or the chat history.

use std::collections::HashSet;

use uuid::Uuid;

use chat_core::agent::{AgentDefinition, SeedMessage, StepDefinition};

use crate::condition::Gate;
use crate::context::{ExecutionContext, PromptMessage, CHAT_HISTORY_VAR, PROMPT_VAR};
use crate::error::{Result, RunnerError};
use crate::model::ModelRequest;
use crate::template::{escape, render};

/// Prompt templates of one step
#[derive(Debug, Clone)]
pub struct PromptUnit {
    step_name: String,
    system_template: String,
    message_template: String,
    include_history: bool,
    seed_messages: Vec<SeedMessage>,
}

impl PromptUnit {
    fn from_step(step: &StepDefinition) -> Self {
        Self {
            step_name: step.name.trim().to_string(),
            system_template: step.system_template.clone(),
            message_template: step.message_template.clone(),
            include_history: step.include_chat_history,
            seed_messages: step.messages.clone(),
        }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Render the model request for this step against the current context
    pub fn render(&self, context: &ExecutionContext) -> ModelRequest {
        let mut history: Vec<PromptMessage> = self
            .seed_messages
            .iter()
            .map(|m| PromptMessage::new(m.from, render(&m.content, context)))
            .collect();
        if self.include_history {
            history.extend(context.history().iter().cloned());
        }

        ModelRequest {
            system_prompt: render(&self.system_template, context),
            history,
            human_prompt: render(&self.message_template, context),
        }
    }
}

/// One executable unit of a plan
#[derive(Debug, Clone)]
pub enum Unit {
    /// Intermediate step: runs only when its gate passes, output is recorded
    Conditional { gate: Gate, prompt: PromptUnit },
    /// Last step: always runs, output is streamed
    Final { prompt: PromptUnit },
}

impl Unit {
    pub fn step_name(&self) -> &str {
        match self {
            Self::Conditional { prompt, .. } | Self::Final { prompt } => prompt.step_name(),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// Ordered units ending with exactly one final unit
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    agent_id: Option<Uuid>,
    name: String,
    units: Vec<Unit>,
}

impl ExecutionPlan {
    /// Plan used when no agent is selected: one always-run step with the given
    /// system prompt (taken literally), the chat history, and the raw prompt.
    pub fn default_conversation(system_prompt: &str) -> Self {
        let prompt = PromptUnit {
            step_name: "answer".to_string(),
            system_template: escape(system_prompt),
            message_template: format!("{{{}}}", PROMPT_VAR),
            include_history: true,
            seed_messages: Vec::new(),
        };

        Self {
            agent_id: None,
            name: "DefaultConversation".to_string(),
            units: vec![Unit::Final { prompt }],
        }
    }

    pub fn agent_id(&self) -> Option<Uuid> {
        self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Compile an agent definition into an execution plan
pub fn compile(agent: &AgentDefinition) -> Result<ExecutionPlan> {
    let Some((last, intermediate)) = agent.steps.split_last() else {
        return Err(RunnerError::definition("agent must have at least one step"));
    };

    let mut defined: HashSet<&str> = HashSet::new();
    let mut units = Vec::with_capacity(agent.steps.len());

    for (index, step) in agent.steps.iter().enumerate() {
        let name = step.name.trim();
        if name.is_empty() {
            return Err(RunnerError::definition(format!(
                "step {} has an empty name",
                index + 1
            )));
        }
        if name == PROMPT_VAR || name == CHAT_HISTORY_VAR {
            return Err(RunnerError::definition(format!(
                "step name {:?} is reserved",
                name
            )));
        }

        for condition in &step.conditions {
            let variable = condition.variable.as_str();
            if variable != PROMPT_VAR && !defined.contains(variable) {
                return Err(RunnerError::definition(format!(
                    "condition on step {:?} references {:?}, which is neither \"prompt\" nor an earlier step",
                    name, variable
                )));
            }
        }

        if !defined.insert(name) {
            return Err(RunnerError::definition(format!(
                "duplicate step name {:?}",
                name
            )));
        }

        if index < intermediate.len() {
            units.push(Unit::Conditional {
                gate: Gate::from_step(step)?,
                prompt: PromptUnit::from_step(step),
            });
        }
    }

    if !last.is_unconditional() {
        return Err(RunnerError::definition(
            "the last step must not have conditions or only-if-previous-messages",
        ));
    }
    units.push(Unit::Final {
        prompt: PromptUnit::from_step(last),
    });

    Ok(ExecutionPlan {
        agent_id: Some(agent.id),
        name: agent.name.clone(),
        units,
    })
}

/// Check an agent definition without keeping the plan
pub fn validate(agent: &AgentDefinition) -> Result<()> {
    compile(agent).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::agent::Condition;
    use chat_core::chat::Sender;

    fn agent(steps: Vec<StepDefinition>) -> AgentDefinition {
        AgentDefinition::new("test", steps)
    }

    fn assert_definition_error(agent: &AgentDefinition) {
        assert!(matches!(
            compile(agent),
            Err(RunnerError::Definition { .. })
        ));
    }

    #[test]
    fn test_compile_orders_units() {
        let plan = compile(&agent(vec![
            StepDefinition::new("topic", "s", "{prompt}"),
            StepDefinition::new("refund", "s", "{prompt}")
                .with_condition(Condition::matching("topic", "refund")),
            StepDefinition::new("answer", "s", "{refund}"),
        ]))
        .unwrap();

        let names: Vec<&str> = plan.units().iter().map(Unit::step_name).collect();
        assert_eq!(names, vec!["topic", "refund", "answer"]);
        assert!(!plan.units()[0].is_final());
        assert!(plan.units()[2].is_final());
    }

    #[test]
    fn test_single_step_is_final() {
        let plan = compile(&agent(vec![StepDefinition::new("answer", "s", "m")])).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.units()[0].is_final());
    }

    #[test]
    fn test_empty_agent_rejected() {
        assert_definition_error(&agent(vec![]));
    }

    #[test]
    fn test_conditional_last_step_rejected() {
        assert_definition_error(&agent(vec![
            StepDefinition::new("a", "s", "m"),
            StepDefinition::new("b", "s", "m").with_condition(Condition::present("a")),
        ]));
        assert_definition_error(&agent(vec![
            StepDefinition::new("b", "s", "m").only_if_previous_messages(),
        ]));
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        assert_definition_error(&agent(vec![
            StepDefinition::new("a", "s", "m"),
            StepDefinition::new(" a ", "s", "m"),
        ]));
        assert_definition_error(&agent(vec![StepDefinition::new("  ", "s", "m")]));
        assert_definition_error(&agent(vec![StepDefinition::new("prompt", "s", "m")]));
    }

    #[test]
    fn test_condition_must_reference_earlier_variable() {
        // typo
        assert_definition_error(&agent(vec![
            StepDefinition::new("topic", "s", "m"),
            StepDefinition::new("x", "s", "m").with_condition(Condition::present("topc")),
            StepDefinition::new("answer", "s", "m"),
        ]));
        // later step
        assert_definition_error(&agent(vec![
            StepDefinition::new("x", "s", "m").with_condition(Condition::present("topic")),
            StepDefinition::new("topic", "s", "m"),
            StepDefinition::new("answer", "s", "m"),
        ]));
        // self reference
        assert_definition_error(&agent(vec![
            StepDefinition::new("x", "s", "m").with_condition(Condition::present("x")),
            StepDefinition::new("answer", "s", "m"),
        ]));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let definition = agent(vec![
            StepDefinition::new("topic", "Classify", "{prompt}"),
            StepDefinition::new("answer", "Answer about {topic}", "{prompt}"),
        ]);
        let ctx = ExecutionContext::new("hi", Vec::new());

        let first = compile(&definition).unwrap();
        let second = compile(&definition).unwrap();
        let render_all = |plan: &ExecutionPlan| -> Vec<ModelRequest> {
            plan.units()
                .iter()
                .map(|u| match u {
                    Unit::Conditional { prompt, .. } | Unit::Final { prompt } => {
                        prompt.render(&ctx)
                    }
                })
                .collect()
        };
        assert_eq!(render_all(&first), render_all(&second));
    }

    #[test]
    fn test_render_includes_seeds_then_history() {
        let step = StepDefinition::new("answer", "sys {prompt}", "Q: {prompt}")
            .with_chat_history()
            .with_message(Sender::Human, "example {prompt}")
            .with_message(Sender::Ai, "example answer");
        let plan = compile(&agent(vec![step])).unwrap();
        let ctx = ExecutionContext::from_history("hi", vec![(Sender::Human, "before".to_string())]);

        let Unit::Final { prompt } = &plan.units()[0] else {
            panic!("expected final unit");
        };
        let request = prompt.render(&ctx);

        assert_eq!(request.system_prompt, "sys hi");
        assert_eq!(request.human_prompt, "Q: hi");
        assert_eq!(
            request.history,
            vec![
                PromptMessage::new(Sender::Human, "example hi"),
                PromptMessage::new(Sender::Ai, "example answer"),
                PromptMessage::new(Sender::Human, "before"),
            ]
        );
    }

    #[test]
    fn test_history_excluded_unless_requested() {
        let plan = compile(&agent(vec![StepDefinition::new("answer", "s", "m")])).unwrap();
        let ctx = ExecutionContext::from_history("hi", vec![(Sender::Human, "before".to_string())]);
        let Unit::Final { prompt } = &plan.units()[0] else {
            panic!("expected final unit");
        };
        assert!(prompt.render(&ctx).history.is_empty());
    }

    #[test]
    fn test_default_conversation_takes_system_prompt_literally() {
        let plan = ExecutionPlan::default_conversation("Reply as JSON: {\"a\": 1}");
        let ctx = ExecutionContext::from_history("hi", vec![(Sender::Ai, "earlier".to_string())]);
        let Unit::Final { prompt } = &plan.units()[0] else {
            panic!("expected final unit");
        };
        let request = prompt.render(&ctx);

        assert_eq!(request.system_prompt, "Reply as JSON: {\"a\": 1}");
        assert_eq!(request.human_prompt, "hi");
        assert_eq!(request.history.len(), 1);
        assert!(plan.agent_id().is_none());
    }
}
