//! Reasoner trait and the zero-shot ReAct implementation

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::agent::{Decision, ScratchEntry, parse_decision};
use crate::llm::{CompletionModel, CompletionRequest};
use crate::memory::TurnRecord;
use crate::tool::Toolset;

/// Stop sequence that keeps the model from inventing observations
pub const OBSERVATION_STOP: &str = "\nObservation:";

/// Everything the reasoner sees when choosing the next move
pub struct ReasoningContext<'a> {
    pub question: &'a str,
    pub tools: &'a Toolset,
    /// Prior turns of the same session, oldest first
    pub history: &'a [TurnRecord],
    pub scratchpad: &'a [ScratchEntry],
}

/// Chooses a tool or finishes
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(&self, context: &ReasoningContext<'_>) -> Result<Decision>;
}

/// Thought / Action / Action Input / Observation prompting over a completion model
pub struct ReActReasoner {
    model: Arc<dyn CompletionModel>,
}

impl ReActReasoner {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub fn build_prompt(context: &ReasoningContext<'_>) -> String {
        let mut prompt = format!(
            "Answer the following questions as best you can. You have access to the following tools:\n\n\
             {tools}\n\n\
             Use the following format:\n\n\
             Question: the input question you must answer\n\
             Thought: you should always think about what to do\n\
             Action: the action to take, should be one of [{names}]\n\
             Action Input: the input to the action\n\
             Observation: the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original input question\n\n\
             Begin!\n\n",
            tools = context.tools.describe(),
            names = context.tools.names().join(", "),
        );

        if !context.history.is_empty() {
            prompt.push_str("Previous conversation:\n");
            for record in context.history {
                prompt.push_str(&format!("Human: {}\nAI: {}\n", record.utterance, record.answer));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Question: {}\nThought:", context.question));

        for entry in context.scratchpad {
            prompt.push_str(&format!(
                " {}\nAction: {}\nAction Input: {}\nObservation: {}\nThought:",
                entry.thought, entry.tool, entry.input, entry.observation
            ));
        }

        prompt
    }
}

#[async_trait]
impl Reasoner for ReActReasoner {
    async fn decide(&self, context: &ReasoningContext<'_>) -> Result<Decision> {
        let prompt = Self::build_prompt(context);
        let output = self
            .model
            .complete(CompletionRequest::new(prompt).stop(OBSERVATION_STOP))
            .await?;

        debug!("Reasoner output: {}", output.trim());
        parse_decision(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::tool::Tool;
    use std::sync::Mutex;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        async fn invoke(&self, _input: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    /// Returns a fixed completion and keeps the last request
    struct FixedModel {
        reply: String,
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionModel for FixedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            *self.seen.lock().unwrap() = Some(request);
            Ok(self.reply.clone())
        }
    }

    fn toolset() -> Toolset {
        let mut tools = Toolset::new();
        tools
            .register(Arc::new(Named("Warehouse Query", "Questions about orders.")))
            .unwrap();
        tools
            .register(Arc::new(Named("Calculator", "Math calculations.")))
            .unwrap();
        tools
    }

    #[test]
    fn test_prompt_lists_tools_in_order() {
        let tools = toolset();
        let context = ReasoningContext {
            question: "What did alice spend?",
            tools: &tools,
            history: &[],
            scratchpad: &[],
        };

        let prompt = ReActReasoner::build_prompt(&context);
        let query_pos = prompt.find("Warehouse Query: Questions about orders.").unwrap();
        let calc_pos = prompt.find("Calculator: Math calculations.").unwrap();
        assert!(query_pos < calc_pos);
        assert!(prompt.contains("should be one of [Warehouse Query, Calculator]"));
        assert!(prompt.ends_with("Question: What did alice spend?\nThought:"));
        assert!(!prompt.contains("Previous conversation"));
    }

    #[test]
    fn test_prompt_includes_history_and_scratchpad() {
        let tools = toolset();
        let history = vec![TurnRecord::new("s", "Who spent most?", "alice", 1)];
        let scratchpad = vec![ScratchEntry {
            thought: "I need totals".to_string(),
            tool: "Warehouse Query".to_string(),
            input: "total per customer".to_string(),
            observation: "alice | 132.75".to_string(),
        }];
        let context = ReasoningContext {
            question: "And how much?",
            tools: &tools,
            history: &history,
            scratchpad: &scratchpad,
        };

        let prompt = ReActReasoner::build_prompt(&context);
        assert!(prompt.contains("Previous conversation:\nHuman: Who spent most?\nAI: alice\n"));
        assert!(prompt.ends_with(
            "Question: And how much?\nThought: I need totals\nAction: Warehouse Query\n\
             Action Input: total per customer\nObservation: alice | 132.75\nThought:"
        ));
    }

    #[tokio::test]
    async fn test_decide_uses_observation_stop() {
        let model = Arc::new(FixedModel {
            reply: " done\nFinal Answer: 3".to_string(),
            seen: Mutex::new(None),
        });
        let reasoner = ReActReasoner::new(model.clone());
        let tools = toolset();
        let context = ReasoningContext {
            question: "q",
            tools: &tools,
            history: &[],
            scratchpad: &[],
        };

        let decision = reasoner.decide(&context).await.unwrap();
        assert!(matches!(decision, Decision::FinalAnswer { answer, .. } if answer == "3"));

        let seen = model.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.stop, vec![OBSERVATION_STOP.to_string()]);
    }

    #[tokio::test]
    async fn test_decide_rejects_free_text() {
        let model = Arc::new(FixedModel {
            reply: "The answer is 3.".to_string(),
            seen: Mutex::new(None),
        });
        let reasoner = ReActReasoner::new(model);
        let tools = toolset();
        let context = ReasoningContext {
            question: "q",
            tools: &tools,
            history: &[],
            scratchpad: &[],
        };

        assert!(matches!(
            reasoner.decide(&context).await,
            Err(Error::UnparseableReasonerOutput(_))
        ));
    }
}
