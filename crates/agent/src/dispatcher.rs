//! Concurrent tool dispatch.
//!
//! Every matched call runs as its own task on a [`JoinSet`], bounded by a
//! per-call deadline. Failures stay with the call that caused them: a tool
//! error, a timeout, or a panic becomes that call's `error` and the other
//! calls are unaffected. Dropping the dispatch future aborts whatever is
//! still running.

use chrono::Utc;
use futures::FutureExt;
use rustedlens_core::error::ToolError;
use rustedlens_core::event::{DomainEvent, EventBus};
use rustedlens_core::tool::{ToolCall, ToolContext, ToolParams, ToolRegistry, ToolResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// What to do with calls naming a tool the registry does not have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedToolPolicy {
    /// Drop the call silently
    #[default]
    Ignore,
    /// Return an error result for it
    Report,
}

impl UnmatchedToolPolicy {
    pub fn from_report_flag(report: bool) -> Self {
        if report { Self::Report } else { Self::Ignore }
    }
}

/// Runs batches of tool calls against a registry.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    unmatched: UnmatchedToolPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(120),
            unmatched: UnmatchedToolPolicy::default(),
            event_bus: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Deadline for each call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedToolPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Publish a `ToolExecuted` event for every finished call.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Overlay call params onto a tool's defaults. Keys the tool does not
    /// declare are ignored.
    pub fn merge_params(mut defaults: ToolParams, overrides: &ToolParams) -> ToolParams {
        for (key, value) in overrides {
            if let Some(slot) = defaults.get_mut(key) {
                *slot = value.clone();
            }
        }
        defaults
    }

    /// Execute every call concurrently and wait for all of them.
    ///
    /// Results come back in completion order. Unknown tools are handled per
    /// [`UnmatchedToolPolicy`].
    pub async fn dispatch(&self, calls: &[ToolCall], context: ToolContext) -> Vec<ToolResult> {
        let mut results = Vec::new();
        if calls.is_empty() {
            return results;
        }

        let context = Arc::new(context);
        let mut set = JoinSet::new();

        for call in calls {
            let Some(tool) = self.registry.get(&call.category, &call.name) else {
                match self.unmatched {
                    UnmatchedToolPolicy::Ignore => {
                        debug!(tool = %call.qualified_name(), "Ignoring unknown tool");
                    }
                    UnmatchedToolPolicy::Report => {
                        warn!(tool = %call.qualified_name(), "Unknown tool requested");
                        results.push(ToolResult::err(
                            call.name.clone(),
                            format!("Unknown tool: {}", call.qualified_name()),
                        ));
                    }
                }
                continue;
            };

            let params = Self::merge_params(tool.default_params(), &call.params);
            let context = Arc::clone(&context);
            let timeout = self.timeout;
            let tool_name = call.name.clone();

            debug!(tool = %call.qualified_name(), "Dispatching tool");
            set.spawn(async move {
                let start = Instant::now();
                let invocation = AssertUnwindSafe(tool.invoke(params, &context)).catch_unwind();
                let result = match tokio::time::timeout(timeout, invocation).await {
                    Ok(Ok(Ok(output))) => ToolResult::ok(tool_name.clone(), output),
                    Ok(Ok(Err(e))) => ToolResult::err(tool_name.clone(), e.to_string()),
                    Ok(Err(panic)) => ToolResult::err(
                        tool_name.clone(),
                        format!("Tool panicked: {}", panic_message(panic.as_ref())),
                    ),
                    Err(_) => ToolResult::err(
                        tool_name.clone(),
                        ToolError::Timeout {
                            tool_name: tool_name.clone(),
                            timeout_secs: timeout.as_secs(),
                        }
                        .to_string(),
                    ),
                };
                (result, start.elapsed())
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((result, elapsed)) => {
                    if let Some(error) = &result.error {
                        warn!(tool = %result.tool_name, error = %error, "Tool call failed");
                    }
                    self.publish(&result, elapsed);
                    results.push(result);
                }
                // Tasks are never aborted while the set is alive.
                Err(e) => warn!(error = %e, "Tool task did not complete"),
            }
        }

        results
    }

    fn publish(&self, result: &ToolResult, elapsed: Duration) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: result.tool_name.clone(),
                success: !result.is_error(),
                duration_ms: elapsed.as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rustedlens_core::memory::MemoryLog;
    use rustedlens_core::tool::{Tool, ToolOutput};
    use serde_json::{Value, json};

    /// Configurable tool: sleeps, fails, or panics on request.
    struct TestTool {
        name: &'static str,
        delay: Duration,
        behavior: Behavior,
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    impl TestTool {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            Self {
                name,
                delay: Duration::ZERO,
                behavior,
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Tool for TestTool {
        fn category(&self) -> &str {
            "test"
        }
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn default_params(&self) -> ToolParams {
            let mut params = ToolParams::new();
            params.insert("text".into(), Value::String("default".into()));
            params
        }
        async fn invoke(
            &self,
            params: ToolParams,
            context: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(self.delay).await;
            match self.behavior {
                Behavior::Succeed => {
                    let mut snapshot = context.memory.clone();
                    snapshot.message = params["text"].as_str().unwrap_or_default().to_string();
                    if let Some(extra) = params.get("extra") {
                        snapshot.stage = extra.to_string();
                    }
                    Ok(ToolOutput::Memory(snapshot))
                }
                Behavior::Fail => Err(ToolError::ExecutionFailed {
                    tool_name: self.name.into(),
                    reason: "boom".into(),
                }),
                Behavior::Panic => panic!("tool exploded"),
            }
        }
    }

    fn dispatcher(tools: Vec<TestTool>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool));
        }
        ToolDispatcher::new(Arc::new(registry))
    }

    fn call(name: &str) -> ToolCall {
        ToolCall::new("test", name, ToolParams::new())
    }

    fn find<'a>(results: &'a [ToolResult], name: &str) -> &'a ToolResult {
        results.iter().find(|r| r.tool_name == name).unwrap()
    }

    #[test]
    fn merge_only_overrides_declared_keys() {
        let mut defaults = ToolParams::new();
        defaults.insert("prompt".into(), json!(""));
        let mut overrides = ToolParams::new();
        overrides.insert("prompt".into(), json!("a circle"));
        overrides.insert("steps".into(), json!(50));

        let merged = ToolDispatcher::merge_params(defaults, &overrides);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["prompt"], "a circle");
    }

    #[tokio::test]
    async fn params_merge_onto_defaults() {
        let dispatcher = dispatcher(vec![TestTool::new("ok", Behavior::Succeed)]);
        let mut params = ToolParams::new();
        params.insert("extra".into(), json!("ignored"));
        let results = dispatcher
            .dispatch(&[ToolCall::new("test", "ok", params)], ToolContext::default())
            .await;

        match &results[0].result {
            Some(ToolOutput::Memory(snapshot)) => {
                assert_eq!(snapshot.message, "default");
                assert_eq!(snapshot.stage, "");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_call() {
        let dispatcher = dispatcher(vec![
            TestTool::new("ok", Behavior::Succeed),
            TestTool::new("fails", Behavior::Fail),
            TestTool::new("panics", Behavior::Panic),
        ]);

        let results = dispatcher
            .dispatch(
                &[call("ok"), call("fails"), call("panics")],
                ToolContext::default(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(!find(&results, "ok").is_error());
        assert!(find(&results, "fails").error.as_ref().unwrap().contains("boom"));
        assert!(
            find(&results, "panics")
                .error
                .as_ref()
                .unwrap()
                .contains("tool exploded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out_alone() {
        let dispatcher = dispatcher(vec![
            TestTool::new("slow", Behavior::Succeed).delayed(Duration::from_secs(600)),
            TestTool::new("fast", Behavior::Succeed),
        ])
        .with_timeout(Duration::from_secs(5));

        let results = dispatcher
            .dispatch(&[call("slow"), call("fast")], ToolContext::default())
            .await;

        assert!(find(&results, "slow").error.as_ref().unwrap().contains("timed out"));
        assert!(!find(&results, "fast").is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn calls_run_concurrently() {
        let dispatcher = dispatcher(vec![
            TestTool::new("a", Behavior::Succeed).delayed(Duration::from_secs(10)),
            TestTool::new("b", Behavior::Succeed).delayed(Duration::from_secs(10)),
        ]);

        let start = tokio::time::Instant::now();
        let results = dispatcher
            .dispatch(&[call("a"), call("b")], ToolContext::default())
            .await;

        assert_eq!(results.len(), 2);
        assert!(start.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn unknown_tools_follow_policy() {
        let ignore = dispatcher(vec![TestTool::new("ok", Behavior::Succeed)]);
        let results = ignore
            .dispatch(&[call("missing"), call("ok")], ToolContext::default())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_name, "ok");

        let report = dispatcher(vec![]).with_unmatched_policy(UnmatchedToolPolicy::Report);
        let results = report
            .dispatch(&[ToolCall::new("nope", "missing", ToolParams::new())], ToolContext::default())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error.as_deref(), Some("Unknown tool: nope.missing"));
    }

    #[tokio::test]
    async fn tools_see_context_snapshot() {
        let dispatcher = dispatcher(vec![TestTool::new("ok", Behavior::Succeed)]);
        let log = MemoryLog::seeded("Solve 2+2", vec![]);
        let results = dispatcher
            .dispatch(&[call("ok")], ToolContext { memory: log.all() })
            .await;

        match &results[0].result {
            Some(ToolOutput::Memory(snapshot)) => assert_eq!(snapshot.stage, "Initializing"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishes_tool_events() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher(vec![TestTool::new("fails", Behavior::Fail)]).with_event_bus(bus);

        dispatcher.dispatch(&[call("fails")], ToolContext::default()).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "fails");
                assert!(!success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let dispatcher = dispatcher(vec![]);
        assert!(dispatcher.dispatch(&[], ToolContext::default()).await.is_empty());
    }
}
