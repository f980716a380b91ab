//! `statecraft chat` — Interactive or single-message chat mode.
//!
//! Turns run locally against the configured provider. While the agent is
//! waiting for an answer (`input-required`) the next line continues the
//! same task; otherwise each line starts a new task in the same context.

use statecraft_agent::{TaskRunner, TurnEvent, TurnOutcome, TurnRequest};
use statecraft_config::AppConfig;
use statecraft_core::task::TaskStatus;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the interactive loop remembers between lines.
#[derive(Debug, Default)]
pub struct ChatSession {
    context_id: Option<String>,
    /// Set while the agent waits for the user's answer
    pending_task: Option<String>,
    last_task: Option<String>,
}

impl ChatSession {
    /// The request for the next line of input.
    pub fn request(&self, line: &str) -> TurnRequest {
        let mut request = TurnRequest::new(line);
        if let Some(context_id) = &self.context_id {
            request = request.with_context(context_id);
        }
        if let Some(task_id) = &self.pending_task {
            request = request.with_task(task_id);
        }
        request
    }

    pub fn record(&mut self, outcome: &TurnOutcome) {
        self.context_id = Some(outcome.context_id.clone());
        self.last_task = Some(outcome.task_id.clone());
        self.pending_task =
            (outcome.status == TaskStatus::InputRequired).then(|| outcome.task_id.clone());
    }

    /// Drop any pending question and start over in a fresh context.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_waiting(&self) -> bool {
        self.pending_task.is_some()
    }
}

pub async fn run(config: AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!("  warning: no API key configured (set STATECRAFT_API_KEY or OPENAI_API_KEY,");
        eprintln!(
            "  or llm.api_key in {})",
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    let provider = statecraft_providers::build_from_config(&config)?;
    let runner = Arc::new(statecraft_gateway::build_runner(&config, provider));
    statecraft_gateway::spawn_event_logger(runner.event_bus());
    let mut session = ChatSession::default();

    if let Some(msg) = message {
        // Single message mode
        let outcome = turn(&runner, &session, &msg).await?;
        println!("{}", outcome.text());
        if outcome.status != TaskStatus::Completed {
            eprintln!("  [{}]", outcome.status);
        }
        return Ok(());
    }

    println!();
    println!("  Statecraft — interactive mode");
    println!("  Model:     {}", config.llm.model);
    println!("  Tools:     {}", runner.agent().tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/state' shows the task state, '/new' starts over, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(&session)?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "exit" | "quit" => break,
            "/new" => session.reset(),
            "/state" => show_state(&runner, &session),
            _ => match turn(&runner, &session, line).await {
                Ok(outcome) => {
                    println!();
                    for text_line in outcome.text().lines() {
                        println!("  Agent > {text_line}");
                    }
                    if matches!(outcome.status, TaskStatus::Failed | TaskStatus::Canceled) {
                        println!("  [{}]", outcome.status);
                    }
                    println!();
                    session.record(&outcome);
                }
                Err(e) => {
                    warn!(error = %e, "Turn failed, starting a new session");
                    eprintln!("  [Error] {e}");
                    session.reset();
                }
            },
        }
        prompt(&session)?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt(session: &ChatSession) -> std::io::Result<()> {
    if session.is_waiting() {
        print!("  You (answer) > ");
    } else {
        print!("  You > ");
    }
    std::io::stdout().flush()
}

/// Run one turn, echoing tool activity to stderr.
async fn turn(
    runner: &TaskRunner,
    session: &ChatSession,
    line: &str,
) -> Result<TurnOutcome, Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::ToolCall { name, .. } => eprintln!("  ... {name}"),
                TurnEvent::ToolResult { name, success: false, output, .. } => {
                    eprintln!("  ... {name} failed: {output}")
                }
                _ => {}
            }
        }
    });
    let outcome = runner.handle(session.request(line), Some(tx)).await;
    let _ = printer.await;
    let outcome = outcome?;
    debug!(
        context_id = %outcome.context_id,
        task_id = %outcome.task_id,
        status = %outcome.status,
        "Turn finished"
    );
    Ok(outcome)
}

fn show_state(runner: &TaskRunner, session: &ChatSession) {
    let Some(task_id) = &session.last_task else {
        println!("  (no task yet)");
        return;
    };
    match runner.outcome(task_id) {
        Ok(outcome) => {
            let view = outcome
                .state_artifact
                .map(|snapshot| serde_json::json!({ "revision": snapshot.revision, "data": snapshot.data }))
                .unwrap_or_default();
            println!(
                "  [{}] {}",
                outcome.status,
                serde_json::to_string_pretty(&view).unwrap_or_default()
            );
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}
