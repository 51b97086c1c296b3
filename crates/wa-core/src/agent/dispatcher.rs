//! Reason / act / observe loop
//!
//! `AWAITING_INPUT -> REASONING -> {TOOL_CALL -> REASONING}* -> DONE`
//!
//! Tool failures the reasoner can work around (bad SQL, tool errors,
//! unknown tool names, tool timeouts) come back as observations. Anything
//! else ends the turn with an error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agent::{DispatchState, Decision, ReasoningContext, Reasoner, ScratchEntry, Step, Turn};
use crate::config::AgentConfig;
use crate::memory::{TranscriptStore, TurnRecord};
use crate::tool::Toolset;
use crate::{Error, Result};

/// Dispatcher limits
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_steps: usize,
    pub step_timeout: Duration,
    pub turn_timeout: Duration,
    pub max_observation_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for DispatcherConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            turn_timeout: Duration::from_secs(config.turn_timeout_secs),
            max_observation_chars: config.max_observation_chars,
        }
    }
}

struct Memory {
    store: Arc<TranscriptStore>,
    window: usize,
}

/// Store access runs on the blocking pool; the connection is synchronous.
impl Memory {
    async fn recent(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        let store = self.store.clone();
        let session_id = session_id.to_string();
        let window = self.window;
        tokio::task::spawn_blocking(move || store.recent(&session_id, window))
            .await
            .map_err(|e| Error::Other(format!("memory task failed: {}", e)))?
    }

    async fn append(&self, record: TurnRecord) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.append(&record))
            .await
            .map_err(|e| Error::Other(format!("memory task failed: {}", e)))?
    }
}

/// Drives one turn at a time against a fixed toolset
pub struct Dispatcher {
    reasoner: Arc<dyn Reasoner>,
    tools: Arc<Toolset>,
    memory: Option<Memory>,
    config: DispatcherConfig,
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

impl Dispatcher {
    pub fn new(reasoner: Arc<dyn Reasoner>, tools: Arc<Toolset>, config: DispatcherConfig) -> Self {
        Self {
            reasoner,
            tools,
            memory: None,
            config,
        }
    }

    /// Thread the last `window` turns of a session into the reasoner prompt
    pub fn with_memory(mut self, store: Arc<TranscriptStore>, window: usize) -> Self {
        self.memory = Some(Memory { store, window });
        self
    }

    pub fn tools(&self) -> &Toolset {
        &self.tools
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Forget a session's transcript, if memory is enabled
    pub fn forget(&self, session_id: &str) -> Result<usize> {
        match &self.memory {
            Some(memory) => memory.store.clear(session_id),
            None => Ok(0),
        }
    }

    /// Answer one utterance.
    ///
    /// # Errors
    /// `StepBudgetExceeded` when no final answer arrives within `max_steps`
    /// cycles, `Timeout` for a reasoner or turn timeout, and any
    /// non-recoverable tool error such as `Connection`.
    pub async fn run(&self, utterance: &str, session_id: Option<&str>) -> Result<Turn> {
        debug!("Dispatch state: {}", DispatchState::AwaitingInput);

        if utterance.trim().is_empty() {
            debug!("Dispatch state: {} (empty input)", DispatchState::Done);
            return Ok(Turn::empty(utterance));
        }

        let turn = tokio::time::timeout(self.config.turn_timeout, self.run_turn(utterance, session_id))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "turn exceeded {}s",
                    self.config.turn_timeout.as_secs_f64()
                ))
            })??;

        if let (Some(memory), Some(session_id)) = (&self.memory, session_id) {
            let record = TurnRecord::new(session_id, utterance, &turn.answer, turn.step_count());
            if let Err(e) = memory.append(record).await {
                warn!("Failed to record turn for session {}: {}", session_id, e);
            }
        }

        Ok(turn)
    }

    async fn run_turn(&self, utterance: &str, session_id: Option<&str>) -> Result<Turn> {
        let history = match (&self.memory, session_id) {
            (Some(memory), Some(id)) => memory.recent(id).await?,
            _ => Vec::new(),
        };

        let mut scratchpad: Vec<ScratchEntry> = Vec::new();
        let mut steps: Vec<Step> = Vec::new();

        for cycle in 1..=self.config.max_steps {
            debug!("Dispatch state: {} (cycle {})", DispatchState::Reasoning, cycle);

            let context = ReasoningContext {
                question: utterance,
                tools: &self.tools,
                history: &history,
                scratchpad: &scratchpad,
            };
            let decision = tokio::time::timeout(self.config.step_timeout, self.reasoner.decide(&context))
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "reasoner exceeded {}s",
                        self.config.step_timeout.as_secs_f64()
                    ))
                })??;

            match decision {
                Decision::FinalAnswer { answer, .. } => {
                    debug!("Dispatch state: {}", DispatchState::Done);
                    info!("Turn finished after {} cycles, {} tool calls", cycle, steps.len());
                    return Ok(Turn {
                        utterance: utterance.to_string(),
                        answer,
                        steps,
                        cycles: cycle,
                    });
                }
                Decision::ToolCall { thought, tool, input } => {
                    debug!("Dispatch state: {} ({}: {})", DispatchState::ToolCall, tool, input);

                    let observation = if self.tools.contains(&tool) {
                        let output = self.call_tool(&tool, &input).await?;
                        steps.push(Step {
                            thought: thought.clone(),
                            tool: tool.clone(),
                            input: input.clone(),
                            output: output.clone(),
                        });
                        output
                    } else {
                        warn!("Reasoner selected unknown tool: {}", tool);
                        format!(
                            "{} is not a valid tool, try one of [{}].",
                            tool,
                            self.tools.names().join(", ")
                        )
                    };

                    scratchpad.push(ScratchEntry {
                        thought,
                        tool,
                        input,
                        observation: truncate_chars(&observation, self.config.max_observation_chars),
                    });
                }
            }
        }

        warn!("Step budget of {} exhausted", self.config.max_steps);
        Err(Error::StepBudgetExceeded {
            max_steps: self.config.max_steps,
        })
    }

    /// Invoke a registered tool, turning recoverable failures into observations
    async fn call_tool(&self, tool: &str, input: &str) -> Result<String> {
        match tokio::time::timeout(self.config.step_timeout, self.tools.invoke(tool, input)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.is_recoverable() => {
                warn!("Tool {} failed: {}", tool, e);
                Ok(format!("Error: {}", e))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Tool {} timed out", tool);
                Ok(format!(
                    "Error: {} timed out after {}s",
                    tool,
                    self.config.step_timeout.as_secs_f64()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted decisions and records the scratchpad it was shown
    struct ScriptedReasoner {
        script: Mutex<VecDeque<Decision>>,
        seen: Mutex<Vec<Vec<ScratchEntry>>>,
        histories: Mutex<Vec<usize>>,
    }

    impl ScriptedReasoner {
        fn new(script: Vec<Decision>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
                histories: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        async fn decide(&self, context: &ReasoningContext<'_>) -> Result<Decision> {
            self.seen.lock().unwrap().push(context.scratchpad.to_vec());
            self.histories.lock().unwrap().push(context.history.len());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::UnparseableReasonerOutput("script exhausted".into()))
        }
    }

    struct SlowReasoner;

    #[async_trait]
    impl Reasoner for SlowReasoner {
        async fn decide(&self, _context: &ReasoningContext<'_>) -> Result<Decision> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(final_answer("late"))
        }
    }

    enum Behavior {
        Echo,
        Fail,
        Disconnected,
        Hang,
    }

    struct TestTool {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl TestTool {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for TestTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        async fn invoke(&self, input: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Echo => Ok(format!("echo {}", input)),
                Behavior::Fail => Err(Error::ToolExecution("division by zero".into())),
                Behavior::Disconnected => Err(Error::Connection("warehouse down".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok("too late".into())
                }
            }
        }
    }

    fn call(tool: &str, input: &str) -> Decision {
        Decision::ToolCall {
            thought: format!("use {}", tool),
            tool: tool.to_string(),
            input: input.to_string(),
        }
    }

    fn final_answer(answer: &str) -> Decision {
        Decision::FinalAnswer {
            thought: "I now know the final answer".to_string(),
            answer: answer.to_string(),
        }
    }

    fn toolset(tools: Vec<Arc<TestTool>>) -> Arc<Toolset> {
        let mut set = Toolset::new();
        for tool in tools {
            set.register(tool).unwrap();
        }
        Arc::new(set)
    }

    fn config(max_steps: usize) -> DispatcherConfig {
        DispatcherConfig {
            max_steps,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let reasoner = ScriptedReasoner::new(vec![final_answer("hello")]);
        let dispatcher = Dispatcher::new(reasoner, toolset(vec![echo.clone()]), config(5));

        let turn = dispatcher.run("hi", None).await.unwrap();
        assert_eq!(turn.answer, "hello");
        assert_eq!(turn.step_count(), 0);
        assert_eq!(turn.cycles, 1);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tool_output_feeds_next_step() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let other = TestTool::new("Other", Behavior::Echo);
        let reasoner = ScriptedReasoner::new(vec![call("Echo", "ping"), final_answer("pong")]);
        let dispatcher = Dispatcher::new(
            reasoner.clone(),
            toolset(vec![echo.clone(), other.clone()]),
            config(5),
        );

        let turn = dispatcher.run("play", None).await.unwrap();
        assert_eq!(turn.answer, "pong");
        assert_eq!(turn.step_count(), 1);
        assert_eq!(turn.steps[0].tool, "Echo");
        assert_eq!(turn.steps[0].output, "echo ping");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(other.calls.load(Ordering::SeqCst), 0);

        let seen = reasoner.seen.lock().unwrap();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].len(), 1);
        assert_eq!(seen[1][0].observation, "echo ping");
    }

    #[tokio::test]
    async fn test_step_budget_exceeded() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let script = (0..10).map(|i| call("Echo", &i.to_string())).collect();
        let reasoner = ScriptedReasoner::new(script);
        let dispatcher = Dispatcher::new(reasoner, toolset(vec![echo.clone()]), config(3));

        let err = dispatcher.run("loop forever", None).await.unwrap_err();
        assert!(matches!(err, Error::StepBudgetExceeded { max_steps: 3 }));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let calc = TestTool::new("Calculator", Behavior::Echo);
        let reasoner = ScriptedReasoner::new(vec![call("Search", "weather"), final_answer("sorry")]);
        let dispatcher = Dispatcher::new(
            reasoner.clone(),
            toolset(vec![echo, calc]),
            config(5),
        );

        let turn = dispatcher.run("weather?", None).await.unwrap();
        assert_eq!(turn.answer, "sorry");
        assert!(turn.steps.is_empty());
        assert_eq!(turn.cycles, 2);

        let seen = reasoner.seen.lock().unwrap();
        assert_eq!(
            seen[1][0].observation,
            "Search is not a valid tool, try one of [Echo, Calculator]."
        );
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let failing = TestTool::new("Calculator", Behavior::Fail);
        let reasoner = ScriptedReasoner::new(vec![call("Calculator", "1/0"), final_answer("undefined")]);
        let dispatcher = Dispatcher::new(reasoner.clone(), toolset(vec![failing]), config(5));

        let turn = dispatcher.run("1/0?", None).await.unwrap();
        assert_eq!(turn.answer, "undefined");
        assert_eq!(turn.step_count(), 1);

        let seen = reasoner.seen.lock().unwrap();
        assert!(seen[1][0].observation.starts_with("Error: "));
        assert!(seen[1][0].observation.contains("division by zero"));
    }

    #[tokio::test]
    async fn test_connection_error_is_fatal() {
        let query = TestTool::new("Warehouse Query", Behavior::Disconnected);
        let reasoner = ScriptedReasoner::new(vec![call("Warehouse Query", "orders?"), final_answer("x")]);
        let dispatcher = Dispatcher::new(reasoner, toolset(vec![query]), config(5));

        let err = dispatcher.run("orders?", None).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_fatal() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let reasoner = ScriptedReasoner::new(vec![]);
        let dispatcher = Dispatcher::new(reasoner, toolset(vec![echo]), config(5));

        let err = dispatcher.run("anything", None).await.unwrap_err();
        assert!(matches!(err, Error::UnparseableReasonerOutput(_)));
    }

    #[tokio::test]
    async fn test_tool_timeout_becomes_observation() {
        let hang = TestTool::new("Slow", Behavior::Hang);
        let reasoner = ScriptedReasoner::new(vec![call("Slow", "x"), final_answer("gave up")]);
        let dispatcher = Dispatcher::new(
            reasoner.clone(),
            toolset(vec![hang]),
            DispatcherConfig {
                max_steps: 3,
                step_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let turn = dispatcher.run("slow", None).await.unwrap();
        assert_eq!(turn.answer, "gave up");
        let seen = reasoner.seen.lock().unwrap();
        assert!(seen[1][0].observation.contains("timed out"));
    }

    #[tokio::test]
    async fn test_reasoner_timeout_is_fatal() {
        let dispatcher = Dispatcher::new(
            Arc::new(SlowReasoner),
            toolset(vec![]),
            DispatcherConfig {
                step_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let err = dispatcher.run("hello", None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_turn_timeout() {
        let hang = TestTool::new("Slow", Behavior::Hang);
        let script = (0..10).map(|_| call("Slow", "x")).collect();
        let dispatcher = Dispatcher::new(
            ScriptedReasoner::new(script),
            toolset(vec![hang]),
            DispatcherConfig {
                max_steps: 10,
                step_timeout: Duration::from_millis(40),
                turn_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );

        let err = dispatcher.run("slow", None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(msg) if msg.contains("turn")));
    }

    #[tokio::test]
    async fn test_empty_utterance_skips_reasoner() {
        let reasoner = ScriptedReasoner::new(vec![]);
        let dispatcher = Dispatcher::new(reasoner.clone(), toolset(vec![]), config(5));

        let turn = dispatcher.run("   ", None).await.unwrap();
        assert_eq!(turn.answer, "");
        assert_eq!(turn.cycles, 0);
        assert!(reasoner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observation_truncated_in_scratchpad_only() {
        let echo = TestTool::new("Echo", Behavior::Echo);
        let long_input = "x".repeat(100);
        let reasoner = ScriptedReasoner::new(vec![call("Echo", &long_input), final_answer("ok")]);
        let dispatcher = Dispatcher::new(
            reasoner.clone(),
            toolset(vec![echo]),
            DispatcherConfig {
                max_observation_chars: 10,
                ..Default::default()
            },
        );

        let turn = dispatcher.run("long", None).await.unwrap();
        assert_eq!(turn.steps[0].output.len(), 105);
        let seen = reasoner.seen.lock().unwrap();
        assert_eq!(seen[1][0].observation, "echo xxxxx... [truncated]");
    }

    #[tokio::test]
    async fn test_memory_threads_prior_turns() {
        let store = Arc::new(TranscriptStore::in_memory().unwrap());
        let reasoner = ScriptedReasoner::new(vec![
            final_answer("first"),
            final_answer("second"),
            final_answer("third"),
        ]);
        let dispatcher = Dispatcher::new(reasoner.clone(), toolset(vec![]), config(5))
            .with_memory(store.clone(), 5);

        dispatcher.run("one", Some("s1")).await.unwrap();
        dispatcher.run("two", Some("s1")).await.unwrap();
        dispatcher.run("elsewhere", Some("s2")).await.unwrap();

        assert_eq!(*reasoner.histories.lock().unwrap(), vec![0, 1, 0]);
        let records = store.recent("s1", 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].answer, "second");

        assert_eq!(dispatcher.forget("s1").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_session_means_no_memory() {
        let store = Arc::new(TranscriptStore::in_memory().unwrap());
        let reasoner = ScriptedReasoner::new(vec![final_answer("a")]);
        let dispatcher = Dispatcher::new(reasoner, toolset(vec![]), config(5))
            .with_memory(store.clone(), 5);

        dispatcher.run("q", None).await.unwrap();
        assert_eq!(store.count("").unwrap(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_memory_access_does_not_block_runtime() {
        let store = Arc::new(TranscriptStore::in_memory().unwrap());
        let reasoner = ScriptedReasoner::new(vec![final_answer("first")]);
        let dispatcher = Arc::new(
            Dispatcher::new(reasoner, toolset(vec![]), config(5)).with_memory(store.clone(), 5),
        );

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let store = store.clone();
            std::thread::spawn(move || {
                let _guard = store.lock().unwrap();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
            })
        };
        locked_rx.recv().unwrap();

        let turn = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run("one", Some("s1")).await }
        });

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!turn.is_finished());

        assert_eq!(turn.await.unwrap().unwrap().answer, "first");
        holder.join().unwrap();
        assert_eq!(store.count("s1").unwrap(), 1);
    }
}
