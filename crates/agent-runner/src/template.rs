//! Prompt template rendering
//!
//! `{name}` is replaced by the value bound to `name` in the context, unknown
//! names render as the empty string, and `{{` / `}}` are literal braces. The
//! template is scanned once, so substituted text is never expanded again.

use crate::context::ExecutionContext;

/// Render `template` against `context`
pub fn render(template: &str, context: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else if let Some(after) = tail.strip_prefix('}') {
            out.push('}');
            rest = after;
        } else {
            // `tail` starts with a single `{`
            let body = &tail[1..];
            match body.find(['{', '}']) {
                Some(end) if body[end..].starts_with('}') => {
                    let name = &body[..end];
                    out.push_str(context.get(name).unwrap_or_default());
                    rest = &body[end + 1..];
                }
                _ => {
                    out.push('{');
                    rest = body;
                }
            }
        }
    }

    out.push_str(rest);
    out
}

/// Escape `text` so that rendering it yields `text` unchanged
pub fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new("hello", Vec::new());
        ctx.record("topic", "billing question");
        ctx
    }

    #[test]
    fn test_substitutes_variables() {
        assert_eq!(
            render("Q: {prompt} / T: {topic}", &ctx()),
            "Q: hello / T: billing question"
        );
    }

    #[test]
    fn test_unknown_variable_is_empty() {
        assert_eq!(render("[{missing}]", &ctx()), "[]");
        assert_eq!(render("[{}]", &ctx()), "[]");
    }

    #[test]
    fn test_repeated_variable() {
        assert_eq!(render("{prompt} {prompt}", &ctx()), "hello hello");
    }

    #[test]
    fn test_escaped_braces() {
        assert_eq!(render("{{prompt}} is {prompt}", &ctx()), "{prompt} is hello");
        assert_eq!(render("a } b", &ctx()), "a } b");
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        assert_eq!(render("oops {prompt", &ctx()), "oops {prompt");
        assert_eq!(render("{ {prompt}", &ctx()), "{ hello");
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let mut ctx = ExecutionContext::new("{topic}", Vec::new());
        ctx.record("topic", "secret");
        ctx.record("echo", "{{prompt}} and {topic}");

        assert_eq!(render("{prompt}", &ctx), "{topic}");
        assert_eq!(render("{echo}", &ctx), "{{prompt}} and {topic}");
    }

    #[test]
    fn test_render_is_pure() {
        let ctx = ctx();
        let first = render("{topic}: {prompt}", &ctx);
        let second = render("{topic}: {prompt}", &ctx);
        assert_eq!(first, second);
        assert_eq!(ctx.get("topic"), Some("billing question"));
    }

    #[test]
    fn test_escape_round_trips() {
        let text = "json: {\"a\": {}}";
        assert_eq!(render(&escape(text), &ctx()), text);
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(render("héllo {prompt} ✓", &ctx()), "héllo hello ✓");
    }
}
