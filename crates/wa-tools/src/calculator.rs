//! Calculator tool
//!
//! The completion model translates the problem into a single expression,
//! which is then evaluated locally. The translation can still be wrong: a
//! plausible but incorrect expression produces a confident wrong answer.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use wa_core::{CompletionModel, CompletionRequest, Error, Result, Tool};

use crate::expr::{evaluate, format_number};

const OUTPUT_STOP: &str = "```output";
const MAX_EXPRESSION_CHARS: usize = 1000;

static TEXT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```text\s*(.*?)```").unwrap());

const PROMPT: &str = r#"Translate a math problem into a single expression that a calculator can evaluate. The calculator supports + - * / % ^ (or **), parentheses, the functions sqrt abs exp ln log log10 sin cos tan floor ceil round min max, and the constants pi and e. Use the output of evaluating the expression to answer the question.

Question: ${Question with math problem.}
```text
${single line mathematical expression that solves the problem}
```
...evaluate(text)...
```output
${Output of evaluating the expression}
```
Answer: ${Answer}

Begin.

Question: What is 37593 * 67?
```text
37593 * 67
```
...evaluate("37593 * 67")...
```output
2518731
```
Answer: 2518731

Question: 37593^(1/5)
```text
37593**(1/5)
```
...evaluate("37593**(1/5)")...
```output
8.222831614237718
```
Answer: 8.222831614237718

Question: "#;

/// LLM-translated arithmetic
pub struct CalculatorTool {
    model: Arc<dyn CompletionModel>,
}

impl CalculatorTool {
    pub const NAME: &'static str = "Calculator";

    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Evaluate a free-form math problem, returning `Answer: <value>`.
    pub async fn evaluate(&self, problem: &str) -> Result<String> {
        let prompt = format!("{}{}\n", PROMPT, problem.trim());
        let reply = self
            .model
            .complete(CompletionRequest::new(prompt).stop(OUTPUT_STOP))
            .await?;

        interpret_reply(&reply)
    }
}

fn interpret_reply(reply: &str) -> Result<String> {
    let reply = reply.trim();

    if let Some(caps) = TEXT_BLOCK_RE.captures(reply) {
        let expression = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if expression.chars().count() > MAX_EXPRESSION_CHARS {
            return Err(Error::ToolExecution(format!(
                "expression is longer than {} characters",
                MAX_EXPRESSION_CHARS
            )));
        }
        debug!("Calculator expression: {}", expression);
        let value = evaluate(expression).map_err(|e| {
            Error::ToolExecution(format!("could not evaluate `{}`: {}", expression, e))
        })?;
        return Ok(format!("Answer: {}", format_number(value)));
    }

    if reply.starts_with("Answer:") {
        return Ok(reply.to_string());
    }

    Err(Error::ToolExecution(format!(
        "unknown format from calculator model: {}",
        reply
    )))
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Useful for when you need to make any math calculations. Use this tool for any and all \
         numerical calculations. The input to this tool should be a mathematical expression."
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        self.evaluate(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedModel {
        reply: &'static str,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl FixedModel {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionModel for FixedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request);
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn test_translated_expression_is_evaluated() {
        let model = FixedModel::new("```text\n53 / 2\n```\n...evaluate(\"53 / 2\")...\n");
        let calculator = CalculatorTool::new(model.clone());

        let answer = calculator.evaluate("half of 53").await.unwrap();
        assert_eq!(answer, "Answer: 26.5");

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].prompt.ends_with("Question: half of 53\n"));
        assert_eq!(prompts[0].stop, vec![OUTPUT_STOP.to_string()]);
    }

    #[tokio::test]
    async fn test_integer_result() {
        let calculator = CalculatorTool::new(FixedModel::new("```text\n37593 * 67\n```"));
        assert_eq!(calculator.invoke("37593 times 67").await.unwrap(), "Answer: 2518731");
    }

    #[tokio::test]
    async fn test_direct_answer_passes_through() {
        let calculator = CalculatorTool::new(FixedModel::new(" Answer: 3 apples"));
        assert_eq!(calculator.invoke("how many?").await.unwrap(), "Answer: 3 apples");
    }

    #[tokio::test]
    async fn test_unknown_format_is_tool_error() {
        let calculator = CalculatorTool::new(FixedModel::new("I cannot do math."));
        let err = calculator.invoke("2+2").await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_bad_expression_is_tool_error() {
        let calculator = CalculatorTool::new(FixedModel::new("```text\n__import__('os')\n```"));
        let err = calculator.invoke("hack").await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution(msg) if msg.contains("could not evaluate")));
    }

    #[test]
    fn test_oversized_expression_is_rejected() {
        let reply = format!("```text\n{}\n```", "1+".repeat(600) + "1");
        let err = interpret_reply(&reply).unwrap_err();
        assert!(matches!(err, Error::ToolExecution(msg) if msg.contains("longer than")));

        let nested = format!("```text\n{}1{}\n```", "(".repeat(200), ")".repeat(200));
        let err = interpret_reply(&nested).unwrap_err();
        assert!(matches!(err, Error::ToolExecution(msg) if msg.contains("deeper than")));
    }
}
