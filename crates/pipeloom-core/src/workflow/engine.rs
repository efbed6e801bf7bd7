//! Dependency-driven streaming execution engine.
//!
//! One coordinator task owns the `ExecutionState`. Every ready node runs as
//! its own task and reports back over a single bounded channel; the
//! coordinator advances readiness as terminal events arrive and publishes
//! `ExecutionEvent`s to the caller.
//!
//! # Execution flow
//!
//! 1. Validate the graph; an invalid graph never starts.
//! 2. Seed every node without predecessors.
//! 3. On each node success, launch the successors whose predecessors have
//!    all completed.
//! 4. On the first node failure, cancel everything still active and end
//!    with an `error` event (fail-fast).
//! 5. After `stop()`, launch nothing new and let active nodes drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::StreamExt;
use pipeloom_types::config::EngineSettings;
use pipeloom_types::error::NodeError;
use pipeloom_types::event::ExecutionEvent;
use pipeloom_types::execution::{ValidationReport, WorkflowExecutionResult};
use pipeloom_types::workflow::NodeType;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::executor::{NodeEvent, NodeExecutor};
use super::graph::Graph;
use super::state::ExecutionState;
use super::validator::validate;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow is invalid: {}", .0.errors.join("; "))]
    Validation(ValidationReport),

    /// Internal invariant violation; never caused by a node's own failure.
    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("node event channel closed unexpectedly")]
    StreamClosed,

    #[error("coordinator task failed: {0}")]
    Coordinator(String),
}

// ---------------------------------------------------------------------------
// Stop handle
// ---------------------------------------------------------------------------

/// Cloneable handle that requests a graceful stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; safe to call at any time.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Run handle
// ---------------------------------------------------------------------------

/// A started run: its event stream plus the eventual result.
pub struct RunHandle {
    run_id: Uuid,
    events: ReceiverStream<ExecutionEvent>,
    outcome: JoinHandle<Result<WorkflowExecutionResult, EngineError>>,
    stop: StopHandle,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Split into the event stream and the result future.
    ///
    /// Dropping the event stream before the run ends requests a stop.
    pub fn into_parts(self) -> (ReceiverStream<ExecutionEvent>, RunOutcome) {
        (self.events, RunOutcome(self.outcome))
    }

    /// Discard events and wait for the result.
    pub async fn finish(self) -> Result<WorkflowExecutionResult, EngineError> {
        let (mut events, outcome) = self.into_parts();
        while events.next().await.is_some() {}
        outcome.wait().await
    }
}

/// The coordinator's final result.
pub struct RunOutcome(JoinHandle<Result<WorkflowExecutionResult, EngineError>>);

impl RunOutcome {
    pub async fn wait(self) -> Result<WorkflowExecutionResult, EngineError> {
        self.0
            .await
            .map_err(|e| EngineError::Coordinator(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs validated workflow graphs with an injected node executor.
pub struct ExecutionEngine<E: NodeExecutor> {
    executor: Arc<E>,
    settings: EngineSettings,
    stop: StopHandle,
    last_run: Arc<Mutex<Option<WorkflowExecutionResult>>>,
}

impl<E: NodeExecutor> Clone for ExecutionEngine<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            settings: self.settings.clone(),
            stop: self.stop.clone(),
            last_run: Arc::clone(&self.last_run),
        }
    }
}

impl<E: NodeExecutor> ExecutionEngine<E> {
    pub fn new(executor: E, settings: EngineSettings) -> Self {
        Self::with_shared(Arc::new(executor), settings)
    }

    pub fn with_shared(executor: Arc<E>, settings: EngineSettings) -> Self {
        Self {
            executor,
            settings,
            stop: StopHandle::new(),
            last_run: Arc::new(Mutex::new(None)),
        }
    }

    /// Request a graceful stop of the current run.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Clear the stop flag and the last run's result.
    pub fn reset(&self) {
        self.stop.clear();
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Result of the most recent finished run, if any.
    pub fn last_result(&self) -> Option<WorkflowExecutionResult> {
        self.last_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run to completion and return the terminal result.
    ///
    /// A node failure is reported as `Ok` with `success == false`.
    pub async fn execute(
        &self,
        graph: Arc<Graph>,
        input: impl Into<String>,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        self.execute_stream(graph, input)?.finish().await
    }

    /// Validate and start a run, returning its event stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn execute_stream(
        &self,
        graph: Arc<Graph>,
        input: impl Into<String>,
    ) -> Result<RunHandle, EngineError> {
        let report = validate(&graph);
        if !report.valid {
            return Err(EngineError::Validation(report));
        }
        for warning in &report.warnings {
            tracing::warn!(warning = warning.as_str(), "workflow validation warning");
        }

        let run_id = Uuid::now_v7();
        let buffer = self.settings.event_buffer.max(1);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (node_tx, node_rx) = mpsc::channel(buffer);

        let coordinator = Coordinator {
            run_id,
            graph,
            input: input.into(),
            executor: Arc::clone(&self.executor),
            settings: self.settings.clone(),
            stop: self.stop.clone(),
            state: ExecutionState::new(),
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            node_tx,
            node_rx,
            event_tx,
            consumer_gone: false,
        };

        let last_run = Arc::clone(&self.last_run);
        let span = tracing::info_span!("workflow_run", run_id = %run_id);
        let outcome = tokio::spawn(
            async move {
                let result = coordinator.run().await;
                if let Ok(result) = &result {
                    *last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
                }
                result
            }
            .instrument(span),
        );

        Ok(RunHandle {
            run_id,
            events: ReceiverStream::new(event_rx),
            outcome,
            stop: self.stop.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct NodeMessage {
    node_id: String,
    event: NodeEvent,
}

struct Coordinator<E: NodeExecutor> {
    run_id: Uuid,
    graph: Arc<Graph>,
    input: String,
    executor: Arc<E>,
    settings: EngineSettings,
    stop: StopHandle,
    state: ExecutionState,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    node_tx: mpsc::Sender<NodeMessage>,
    node_rx: mpsc::Receiver<NodeMessage>,
    event_tx: mpsc::Sender<ExecutionEvent>,
    consumer_gone: bool,
}

/// How the readiness loop ended.
enum Ending {
    Finished,
    Stopped,
    Failed { node_id: String, message: String },
}

impl<E: NodeExecutor> Coordinator<E> {
    async fn run(mut self) -> Result<WorkflowExecutionResult, EngineError> {
        let started = Instant::now();
        let total = self.graph.len();
        tracing::info!(total_nodes = total, "workflow run started");

        self.emit(ExecutionEvent::Start {
            run_id: self.run_id,
            total_nodes: total,
        })
        .await;

        let ending = match self.drive().await {
            Ok(ending) => ending,
            Err(e) => {
                tracing::error!(error = %e, "workflow run aborted");
                self.cancel_active("run aborted").await;
                self.emit(ExecutionEvent::Error {
                    message: e.to_string(),
                    node_id: None,
                })
                .await;
                return Err(e);
            }
        };

        let (success, was_stopped, error, failed_node) = match ending {
            Ending::Finished => (true, false, None, None),
            Ending::Stopped => (true, true, None, None),
            Ending::Failed { node_id, message } => (false, false, Some(message), Some(node_id)),
        };

        let final_output = self
            .graph
            .nodes_of_type(NodeType::Output)
            .next()
            .and_then(|n| self.state.output(&n.id))
            .map(str::to_string);

        let result = WorkflowExecutionResult {
            run_id: self.run_id,
            success,
            results: self.state.results().to_vec(),
            final_output,
            total_execution_time_ms: started.elapsed().as_millis() as u64,
            execution_order: self.state.order().to_vec(),
            was_stopped,
            error,
        };

        tracing::info!(
            success = result.success,
            was_stopped = result.was_stopped,
            completed = result.execution_order.len(),
            elapsed_ms = result.total_execution_time_ms,
            "workflow run finished"
        );

        self.emit(ExecutionEvent::terminal(&result, failed_node.as_deref()))
            .await;
        Ok(result)
    }

    /// The readiness loop.
    async fn drive(&mut self) -> Result<Ending, EngineError> {
        let graph = Arc::clone(&self.graph);
        self.observe_stop().await;
        if !self.state.is_stopping() {
            for root in graph.roots() {
                self.launch(&root.id).await?;
            }
        }

        let poll = self.settings.poll_interval();
        let mut drain_deadline: Option<Instant> = None;

        loop {
            if self.state.completed_count() == graph.len() {
                return Ok(Ending::Finished);
            }

            self.observe_stop().await;
            if self.state.is_stopping() && drain_deadline.is_none() {
                drain_deadline = self
                    .settings
                    .stop_drain_timeout()
                    .map(|timeout| Instant::now() + timeout);
            }

            if !self.state.has_active() {
                if self.state.is_stopping() {
                    return Ok(Ending::Stopped);
                }
                return Err(EngineError::Dependency(format!(
                    "no runnable nodes left with {} of {} complete",
                    self.state.completed_count(),
                    graph.len()
                )));
            }

            let mut wait = poll;
            if let Some(deadline) = drain_deadline {
                let now = Instant::now();
                if now >= deadline {
                    tracing::warn!(
                        active = ?self.state.active_ids(),
                        "stop drain deadline reached, cancelling remaining nodes"
                    );
                    self.cancel_active("stop drain deadline exceeded").await;
                    return Ok(Ending::Stopped);
                }
                wait = wait.min(deadline - now);
            }

            let message = match tokio::time::timeout(wait, self.node_rx.recv()).await {
                Err(_elapsed) => continue,
                Ok(None) => return Err(EngineError::StreamClosed),
                Ok(Some(message)) => message,
            };

            if let Some(ending) = self.handle(message).await? {
                return Ok(ending);
            }
        }
    }

    async fn handle(&mut self, message: NodeMessage) -> Result<Option<Ending>, EngineError> {
        let NodeMessage { node_id, event } = message;
        if !self.state.is_active(&node_id) {
            tracing::debug!(node_id = node_id.as_str(), "ignoring event from inactive node");
            return Ok(None);
        }

        match event {
            NodeEvent::Fragment(content) => {
                self.emit(ExecutionEvent::Stream { node_id, content }).await;
                Ok(None)
            }
            NodeEvent::Succeeded(output) => {
                let event = ExecutionEvent::node_complete(self.state.record_success(&node_id, output)?);
                tracing::debug!(node_id = node_id.as_str(), "node succeeded");
                self.emit(event).await;

                self.observe_stop().await;
                if self.state.is_stopping() {
                    return Ok(None);
                }
                let graph = Arc::clone(&self.graph);
                for succ in self.state.ready_successors(&graph, &node_id)? {
                    self.launch(&succ).await?;
                }
                Ok(None)
            }
            NodeEvent::Failed(error) => {
                tracing::warn!(node_id = node_id.as_str(), error = %error, "node failed");
                let event = ExecutionEvent::node_complete(self.state.record_failure(&node_id, &error)?);
                self.emit(event).await;
                self.cancel_active(&format!("node '{node_id}' failed")).await;
                Ok(Some(Ending::Failed {
                    message: format!("node '{node_id}' failed: {error}"),
                    node_id,
                }))
            }
        }
    }

    /// Emit `node_start` and spawn the node's task.
    async fn launch(&mut self, node_id: &str) -> Result<(), EngineError> {
        let node = self
            .graph
            .node(node_id)
            .cloned()
            .ok_or_else(|| EngineError::Dependency(format!("unknown node '{node_id}'")))?;
        let inputs = self.state.inputs_for(&self.graph, node_id, &self.input);

        tracing::debug!(node_id, node_type = %node.node_type(), inputs = inputs.len(), "launching node");
        self.emit(ExecutionEvent::NodeStart {
            node_id: node_id.to_string(),
            node_type: node.node_type(),
        })
        .await;

        let executor = Arc::clone(&self.executor);
        let tx = self.node_tx.clone();
        let token = self.cancel.child_token();
        let span = tracing::debug_span!("node", node_id = node.id.as_str());

        let abort = self.tasks.spawn(
            async move {
                let node_id = node.id.clone();
                let mut stream = executor.execute_streaming(&node, inputs);
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        next = stream.next() => next.unwrap_or_else(|| {
                            NodeEvent::Failed(NodeError::Execution(
                                "executor stream ended without a result".to_string(),
                            ))
                        }),
                    };
                    let terminal = event.is_terminal();
                    let message = NodeMessage {
                        node_id: node_id.clone(),
                        event,
                    };
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        sent = tx.send(message) => {
                            if sent.is_err() || terminal {
                                return;
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        self.state.mark_active(node_id, abort)
    }

    /// Transition into stopping once the flag (or a vanished consumer) is seen.
    async fn observe_stop(&mut self) {
        if self.state.is_stopping() || !(self.stop.is_stopped() || self.consumer_gone) {
            return;
        }
        self.state.set_stopping();
        tracing::info!(active = ?self.state.active_ids(), "stop requested, draining active nodes");
        self.emit(ExecutionEvent::StopRequested {
            message: "stop requested; waiting for active nodes to finish".to_string(),
        })
        .await;
    }

    /// Cancel active tasks, wait out the grace period, then abort stragglers.
    async fn cancel_active(&mut self, reason: &str) {
        if !self.state.has_active() {
            return;
        }
        self.cancel.cancel();
        let grace = self.settings.cancel_grace();
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("tasks did not stop within the cancel grace period, aborting");
        }
        self.tasks.abort_all();

        for result in self.state.cancel_active(reason) {
            tracing::warn!(node_id = result.node_id.as_str(), reason, "node cancelled");
            self.emit(ExecutionEvent::node_complete(&result)).await;
        }
    }

    async fn emit(&mut self, event: ExecutionEvent) {
        if self.consumer_gone {
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("event consumer dropped, requesting stop");
            self.consumer_gone = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::workflow::executor::NodeStream;
    use crate::workflow::graph::{Edge, Node};
    use pipeloom_types::workflow::{
        ContextConfig, InputConfig, LlmNodeConfig, NodeConfig, OutputConfig,
    };

    /// Scripted behavior for one node.
    #[derive(Clone, Default)]
    struct Script {
        delay: Duration,
        fragments: Vec<String>,
        fail: Option<String>,
        hang: bool,
    }

    /// Fake executor: echoes `id(inputs)` after the scripted delay.
    #[derive(Default)]
    struct ScriptedExecutor {
        scripts: HashMap<String, Script>,
        live: Mutex<HashMap<String, usize>>,
        max_concurrent: Mutex<usize>,
    }

    impl ScriptedExecutor {
        fn with(mut self, id: &str, script: Script) -> Self {
            self.scripts.insert(id.to_string(), script);
            self
        }

        fn enter(&self, id: &str) {
            let mut live = self.live.lock().unwrap();
            live.insert(id.to_string(), 1);
            let mut max = self.max_concurrent.lock().unwrap();
            *max = (*max).max(live.len());
        }

        fn leave(&self, id: &str) {
            self.live.lock().unwrap().remove(id);
        }

        fn max_concurrent(&self) -> usize {
            *self.max_concurrent.lock().unwrap()
        }
    }

    impl NodeExecutor for ScriptedExecutor {
        async fn execute(&self, node: &Node, inputs: Vec<String>) -> Result<String, NodeError> {
            Ok(format!("{}({})", node.id, inputs.join(",")))
        }

        fn execute_streaming<'a>(&'a self, node: &'a Node, inputs: Vec<String>) -> NodeStream<'a> {
            let script = self.scripts.get(&node.id).cloned().unwrap_or_default();
            Box::pin(async_stream::stream! {
                self.enter(&node.id);
                tokio::time::sleep(script.delay).await;
                if script.hang {
                    std::future::pending::<()>().await;
                }
                for fragment in &script.fragments {
                    yield NodeEvent::Fragment(fragment.clone());
                }
                self.leave(&node.id);
                match script.fail {
                    Some(message) => yield NodeEvent::Failed(NodeError::Execution(message)),
                    None => yield NodeEvent::Succeeded(format!("{}({})", node.id, inputs.join(","))),
                }
            })
        }
    }

    fn node(id: &str, node_type: NodeType) -> Node {
        let config = match node_type {
            NodeType::Input => NodeConfig::Input(InputConfig::default()),
            NodeType::Generation => NodeConfig::Generation(LlmNodeConfig::default()),
            NodeType::Ensemble => NodeConfig::Ensemble(LlmNodeConfig::default()),
            NodeType::Validation => NodeConfig::Validation(LlmNodeConfig::default()),
            NodeType::Context => NodeConfig::Context(ContextConfig {
                knowledge_base: "kb".to_string(),
                max_chars: None,
            }),
            NodeType::Output => NodeConfig::Output(OutputConfig::default()),
        };
        Node::new(id, config)
    }

    fn graph(nodes: &[(&str, NodeType)], edges: &[(&str, &str)]) -> Arc<Graph> {
        Arc::new(Graph::new(
            nodes.iter().map(|(id, t)| node(id, *t)).collect(),
            edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
        ))
    }

    /// in -> a, in -> b, a -> c, b -> c, c -> out
    fn diamond() -> Arc<Graph> {
        graph(
            &[
                ("in", NodeType::Input),
                ("a", NodeType::Generation),
                ("b", NodeType::Generation),
                ("c", NodeType::Ensemble),
                ("out", NodeType::Output),
            ],
            &[("in", "a"), ("in", "b"), ("a", "c"), ("b", "c"), ("c", "out")],
        )
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            poll_interval_ms: 10,
            event_buffer: 64,
            cancel_grace_ms: 50,
            stop_drain_timeout_secs: Some(300),
        }
    }

    fn slow(ms: u64) -> Script {
        Script {
            delay: Duration::from_millis(ms),
            ..Script::default()
        }
    }

    async fn collect(handle: RunHandle) -> (Vec<ExecutionEvent>, WorkflowExecutionResult) {
        let (events, outcome) = handle.into_parts();
        let events: Vec<ExecutionEvent> = events.collect().await;
        (events, outcome.wait().await.unwrap())
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    fn index_of(events: &[ExecutionEvent], pred: impl Fn(&ExecutionEvent) -> bool) -> usize {
        events.iter().position(|e| pred(e)).unwrap()
    }

    #[tokio::test]
    async fn input_to_output_runs_in_order() {
        let engine = ExecutionEngine::new(ScriptedExecutor::default(), settings());
        let g = graph(
            &[("in", NodeType::Input), ("out", NodeType::Output)],
            &[("in", "out")],
        );
        let result = engine.execute(g, "hello").await.unwrap();
        assert!(result.success);
        assert!(!result.was_stopped);
        assert_eq!(result.execution_order, ["in", "out"]);
        assert_eq!(result.final_output.as_deref(), Some("out(in(hello))"));
        assert_eq!(engine.last_result().unwrap(), result);
    }

    #[tokio::test]
    async fn every_node_completes_once_and_after_its_predecessors() {
        let engine = ExecutionEngine::new(
            ScriptedExecutor::default().with("a", slow(30)).with("b", slow(5)),
            settings(),
        );
        let g = diamond();
        let result = engine.execute(Arc::clone(&g), "q").await.unwrap();

        assert!(result.success);
        assert_eq!(result.execution_order.len(), g.len());
        let mut ids = result.execution_order.clone();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), g.len());
        for edge in g.edges() {
            assert!(
                position(&result.execution_order, &edge.source)
                    < position(&result.execution_order, &edge.target)
            );
        }
        // b is faster than a, so completion order reflects it
        assert!(position(&result.execution_order, "b") < position(&result.execution_order, "a"));
        assert_eq!(result.final_output.as_deref(), Some("out(c(a(in(q)),b(in(q))))"));
    }

    #[tokio::test]
    async fn diamond_branches_run_concurrently() {
        let executor = Arc::new(ScriptedExecutor::default().with("a", slow(50)).with("b", slow(50)));
        let engine = ExecutionEngine::with_shared(Arc::clone(&executor), settings());
        let (events, result) = collect(engine.execute_stream(diamond(), "q").unwrap()).await;

        assert!(result.success);
        assert!(executor.max_concurrent() >= 2);

        // both branches start before either completes
        let a_start = index_of(&events, |e| matches!(e, ExecutionEvent::NodeStart { node_id, .. } if node_id == "a"));
        let b_start = index_of(&events, |e| matches!(e, ExecutionEvent::NodeStart { node_id, .. } if node_id == "b"));
        let first_branch_done = index_of(&events, |e| {
            matches!(e, ExecutionEvent::NodeComplete { node_id, .. } if node_id == "a" || node_id == "b")
        });
        let c_start = index_of(&events, |e| matches!(e, ExecutionEvent::NodeStart { node_id, .. } if node_id == "c"));
        assert!(a_start < first_branch_done && b_start < first_branch_done);
        assert!(c_start > first_branch_done);
    }

    #[tokio::test]
    async fn event_stream_shape() {
        let executor = ScriptedExecutor::default().with(
            "a",
            Script {
                fragments: vec!["x".to_string(), "y".to_string()],
                ..Script::default()
            },
        );
        let engine = ExecutionEngine::new(executor, settings());
        let g = graph(
            &[
                ("in", NodeType::Input),
                ("a", NodeType::Generation),
                ("out", NodeType::Output),
            ],
            &[("in", "a"), ("a", "out")],
        );
        let handle = engine.execute_stream(g, "q").unwrap();
        let run_id = handle.run_id();
        let (events, result) = collect(handle).await;

        assert!(matches!(&events[0], ExecutionEvent::Start { run_id: id, total_nodes: 3 } if *id == run_id));
        assert!(events.last().unwrap().is_terminal());
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        let fragments: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Stream { node_id, content } if node_id == "a" => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fragments, ["x", "y"]);

        let completes = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeComplete { .. }))
            .count();
        assert_eq!(completes, 3);
        assert_eq!(result.results.len(), 3);
    }

    #[tokio::test]
    async fn failure_cancels_active_and_blocks_successors() {
        let executor = ScriptedExecutor::default()
            .with(
                "a",
                Script {
                    delay: Duration::from_millis(10),
                    fail: Some("model exploded".to_string()),
                    ..Script::default()
                },
            )
            .with(
                "b",
                Script {
                    hang: true,
                    ..Script::default()
                },
            );
        let engine = ExecutionEngine::new(executor, settings());
        let (events, result) = collect(engine.execute_stream(diamond(), "q").unwrap()).await;

        assert!(!result.success);
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("'a'") && error.contains("model exploded"));

        let started: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::NodeStart { node_id, .. } => Some(node_id.as_str()),
                _ => None,
            })
            .collect();
        assert!(!started.contains(&"c"));
        assert!(!started.contains(&"out"));

        let b = result.result_for("b").unwrap();
        assert!(!b.success);
        assert!(b.error.as_deref().unwrap().starts_with("cancelled"));

        match events.last().unwrap() {
            ExecutionEvent::Error { message, node_id } => {
                assert!(message.contains("'a'"));
                assert_eq!(node_id.as_deref(), Some("a"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_drains_active_nodes_without_launching_more() {
        let executor = Arc::new(ScriptedExecutor::default().with("a", slow(60)).with("b", slow(80)));
        let engine = ExecutionEngine::with_shared(Arc::clone(&executor), settings());
        let handle = engine.execute_stream(diamond(), "q").unwrap();

        // wait until both branches are running
        while executor.live.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.stop();
        engine.stop();

        let (events, result) = collect(handle).await;
        assert!(result.success);
        assert!(result.was_stopped);
        let order = &result.execution_order;
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "in");
        assert!(order.iter().any(|id| id == "a") && order.iter().any(|id| id == "b"));
        assert!(!order.iter().any(|id| id == "c" || id == "out"));
        assert!(result.final_output.is_none());
        assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::NodeStart { node_id, .. } if node_id == "c")));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ExecutionEvent::StopRequested { .. }))
                .count(),
            1
        );
        assert!(matches!(
            events.last().unwrap(),
            ExecutionEvent::Complete { success: true, was_stopped: true, .. }
        ));
    }

    #[tokio::test]
    async fn drain_deadline_cancels_hung_nodes() {
        let executor = Arc::new(ScriptedExecutor::default().with(
            "a",
            Script {
                hang: true,
                ..Script::default()
            },
        ));
        let mut cfg = settings();
        cfg.stop_drain_timeout_secs = Some(1);
        let engine = ExecutionEngine::with_shared(Arc::clone(&executor), cfg);
        let g = graph(
            &[
                ("in", NodeType::Input),
                ("a", NodeType::Generation),
                ("out", NodeType::Output),
            ],
            &[("in", "a"), ("a", "out")],
        );
        let handle = engine.execute_stream(g, "q").unwrap();
        while !executor.live.lock().unwrap().contains_key("a") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.stop();

        let result = handle.finish().await.unwrap();
        assert!(result.success);
        assert!(result.was_stopped);
        assert_eq!(result.execution_order, ["in"]);
        let a = result.result_for("a").unwrap();
        assert!(!a.success);
        assert!(a.error.as_deref().unwrap().contains("drain deadline"));
    }

    #[tokio::test]
    async fn standalone_context_is_seeded() {
        let engine = ExecutionEngine::new(ScriptedExecutor::default(), settings());
        let g = graph(
            &[
                ("in", NodeType::Input),
                ("ctx", NodeType::Context),
                ("gen", NodeType::Generation),
                ("out", NodeType::Output),
            ],
            &[("in", "gen"), ("ctx", "gen"), ("gen", "out")],
        );
        let result = engine.execute(g, "q").await.unwrap();
        assert!(result.success);
        assert_eq!(result.execution_order.len(), 4);
        assert_eq!(result.final_output.as_deref(), Some("out(gen(in(q),ctx()))"));
    }

    #[tokio::test]
    async fn invalid_graph_never_starts() {
        let engine = ExecutionEngine::new(ScriptedExecutor::default(), settings());
        let g = graph(&[("in", NodeType::Input)], &[]);
        match engine.execute_stream(g, "q") {
            Err(EngineError::Validation(report)) => assert!(!report.errors.is_empty()),
            Ok(_) => panic!("invalid graph was started"),
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(engine.last_result().is_none());
    }

    #[tokio::test]
    async fn reset_clears_stop_flag_for_reuse() {
        let engine = ExecutionEngine::new(ScriptedExecutor::default(), settings());
        let g = graph(
            &[("in", NodeType::Input), ("out", NodeType::Output)],
            &[("in", "out")],
        );

        engine.stop();
        let stopped = engine.execute(Arc::clone(&g), "q").await.unwrap();
        assert!(stopped.was_stopped);
        assert!(stopped.execution_order.is_empty());
        assert!(stopped.final_output.is_none());

        engine.reset();
        assert!(engine.last_result().is_none());
        let result = engine.execute(g, "q").await.unwrap();
        assert!(!result.was_stopped);
        assert_eq!(result.execution_order, ["in", "out"]);
    }

    #[tokio::test]
    async fn dropping_event_stream_requests_stop() {
        let executor = ScriptedExecutor::default().with("a", slow(30)).with("b", slow(30));
        let engine = ExecutionEngine::new(executor, settings());
        let (events, outcome) = engine.execute_stream(diamond(), "q").unwrap().into_parts();
        drop(events);
        let result = outcome.wait().await.unwrap();
        assert!(result.was_stopped);
        assert!(!result.execution_order.contains(&"out".to_string()));
    }
}
