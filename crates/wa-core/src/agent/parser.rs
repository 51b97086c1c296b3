//! Strict parser for Thought / Action / Action Input / Final Answer text

use std::sync::LazyLock;

use regex::Regex;

use crate::agent::Decision;
use crate::{Error, Result};

const FINAL_ANSWER: &str = "Final Answer:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:(.*?)Action\s*\d*\s*Input\s*\d*\s*:(.*)").unwrap()
});

static ACTION_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action\s*\d*\s*:").unwrap());

fn thought_before(text: &str, end: usize) -> String {
    let thought = text[..end].trim();
    thought
        .strip_prefix("Thought:")
        .unwrap_or(thought)
        .trim()
        .to_string()
}

/// Parse reasoner output into a [`Decision`].
///
/// # Errors
/// `UnparseableReasonerOutput` when the text holds both a final answer and an
/// action, neither, or an action without input.
pub fn parse_decision(text: &str) -> Result<Decision> {
    let final_pos = text.find(FINAL_ANSWER);
    let action = ACTION_RE.captures(text);

    match (final_pos, action) {
        (Some(_), Some(_)) => Err(Error::UnparseableReasonerOutput(format!(
            "both a final answer and an action: {}",
            text.trim()
        ))),
        (Some(pos), None) => {
            if ACTION_LABEL_RE.is_match(text) {
                return Err(Error::UnparseableReasonerOutput(format!(
                    "both a final answer and an action: {}",
                    text.trim()
                )));
            }
            Ok(Decision::FinalAnswer {
                thought: thought_before(text, pos),
                answer: text[pos + FINAL_ANSWER.len()..].trim().to_string(),
            })
        }
        (None, Some(caps)) => {
            let (Some(whole), Some(tool), Some(input)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                return Err(Error::UnparseableReasonerOutput(text.trim().to_string()));
            };

            let tool = tool.as_str().trim().to_string();
            if tool.is_empty() {
                return Err(Error::UnparseableReasonerOutput(format!(
                    "action without a tool name: {}",
                    text.trim()
                )));
            }

            let input = input.as_str().trim().trim_matches('"').to_string();
            Ok(Decision::ToolCall {
                thought: thought_before(text, whole.start()),
                tool,
                input,
            })
        }
        (None, None) => Err(Error::UnparseableReasonerOutput(text.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_answer() {
        let decision = parse_decision(" I now know the final answer\nFinal Answer: 42 orders").unwrap();
        assert_eq!(
            decision,
            Decision::FinalAnswer {
                thought: "I now know the final answer".to_string(),
                answer: "42 orders".to_string(),
            }
        );
    }

    #[test]
    fn test_tool_call() {
        let text = " I should look at the orders table.\nAction: Warehouse Query\nAction Input: \"How many orders did alice place?\"";
        let decision = parse_decision(text).unwrap();
        assert_eq!(
            decision,
            Decision::ToolCall {
                thought: "I should look at the orders table.".to_string(),
                tool: "Warehouse Query".to_string(),
                input: "How many orders did alice place?".to_string(),
            }
        );
    }

    #[test]
    fn test_tool_call_multiline_input() {
        let text = "Thought: compute it\nAction: Python\nAction Input: x = 2\nprint(x * 3)\n";
        match parse_decision(text).unwrap() {
            Decision::ToolCall { thought, tool, input } => {
                assert_eq!(thought, "compute it");
                assert_eq!(tool, "Python");
                assert_eq!(input, "x = 2\nprint(x * 3)");
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_both_is_rejected() {
        let text = "Action: Calculator\nAction Input: 2+2\nFinal Answer: 4";
        assert!(matches!(
            parse_decision(text),
            Err(Error::UnparseableReasonerOutput(_))
        ));

        let text = "Final Answer: 4\nAction: Calculator";
        assert!(matches!(
            parse_decision(text),
            Err(Error::UnparseableReasonerOutput(_))
        ));
    }

    #[test]
    fn test_neither_is_rejected() {
        assert!(matches!(
            parse_decision("I think the answer is probably 4."),
            Err(Error::UnparseableReasonerOutput(_))
        ));
        assert!(matches!(
            parse_decision("Action: Calculator"),
            Err(Error::UnparseableReasonerOutput(_))
        ));
        assert!(matches!(
            parse_decision("Action:\nAction Input: 2+2"),
            Err(Error::UnparseableReasonerOutput(_))
        ));
    }
}
