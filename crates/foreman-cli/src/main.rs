//! Demo driver for foreman-core.
//!
//! Wires up an engine, runs a few tasks at different priorities, shows a
//! flaky task recovering through retries, chains a sequential workflow, lets
//! an interval heartbeat fire a couple of times, then drains and prints the
//! statistics snapshot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use foreman_core::{
    ExecutionError, Payload, Priority, ShutdownMode, TaskContext, TaskEngine, TaskSpec,
    WorkflowSpec,
};

#[derive(Debug, Deserialize)]
struct Greeting {
    name: String,
}

/// Prints a greeting from its JSON input.
struct GreetPayload {
    input: serde_json::Value,
}

#[async_trait]
impl Payload for GreetPayload {
    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
        let greeting: Greeting = serde_json::from_value(self.input.clone())
            .map_err(|e| ExecutionError::permanent(format!("json decode: {e}")))?;
        println!("[{}] Hello, {}!", ctx.task_id(), greeting.name);
        Ok(json!({ "greeted": greeting.name }))
    }
}

/// Fails a few times before succeeding, to show retry backoff in the logs.
struct FlakyPayload {
    remaining_failures: AtomicU32,
}

impl FlakyPayload {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Payload for FlakyPayload {
    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ExecutionError::transient(format!(
                "intentional failure (left={left})"
            )));
        }
        Ok(json!({ "attempt": ctx.attempt() }))
    }
}

/// One step in the demo workflow.
struct StepPayload {
    step: &'static str,
}

#[async_trait]
impl Payload for StepPayload {
    async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
        println!("workflow step: {}", self.step);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(json!(self.step))
    }
}

/// Periodic heartbeat driven by an interval trigger.
struct HeartbeatPayload;

#[async_trait]
impl Payload for HeartbeatPayload {
    async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
        println!("heartbeat");
        Ok(serde_json::Value::Null)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = TaskEngine::builder()
        .max_workers(3)
        .tick_interval(Duration::from_millis(200))
        .build()?;

    // (A) Two greetings at different priorities.
    let casual = engine
        .create(
            TaskSpec::new("greet-casual", GreetPayload { input: json!({ "name": "world" }) })
                .priority(Priority::Low),
        )
        .await?;
    let urgent = engine
        .create(
            TaskSpec::new("greet-urgent", GreetPayload { input: json!({ "name": "foreman" }) })
                .priority(Priority::High),
        )
        .await?;
    engine.submit(casual).await?;
    engine.submit(urgent).await?;

    // (B) A flaky task that needs two retries to get through.
    let flaky = engine
        .create(
            TaskSpec::new("flaky", FlakyPayload::new(2))
                .max_retries(3)
                .retry_policy(foreman_core::RetryPolicy {
                    base_delay: Duration::from_millis(100),
                    multiplier: 2.0,
                    max_delay: Duration::from_secs(1),
                    jitter: 0.0,
                }),
        )
        .await?;
    engine.submit(flaky).await?;

    // (C) A three-step sequential workflow.
    let mut steps = Vec::new();
    for step in ["extract", "transform", "load"] {
        let id = engine
            .create(TaskSpec::new(format!("step-{step}"), StepPayload { step }))
            .await?;
        steps.push(id);
    }
    let workflow = engine
        .submit_workflow(WorkflowSpec::sequential("etl", steps.clone()))
        .await?;

    // (D) An interval heartbeat while the rest runs.
    let heartbeat = engine
        .create(TaskSpec::new("heartbeat", HeartbeatPayload))
        .await?;
    engine
        .schedule_every(heartbeat, Duration::from_millis(400))
        .await?;

    // (E) Wait for the foreground work, then stop the heartbeat.
    let flaky_status = engine.wait_for(flaky).await?;
    println!(
        "flaky task finished: state={:?} attempts={}",
        flaky_status.state, flaky_status.attempts
    );
    for id in steps {
        engine.wait_for(id).await?;
    }
    println!(
        "workflow state: {:?}",
        engine.workflow_status(workflow).await?.state
    );

    tokio::time::sleep(Duration::from_millis(900)).await;
    engine.cancel(heartbeat).await?;

    // (F) Drain and report.
    engine.shutdown(ShutdownMode::Drain).await;
    let stats = engine.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
