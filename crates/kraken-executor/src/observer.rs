//! The default [`GraphExecutorObserver`]: prints a line per task transition and a summary once
//! the graph finishes, colored by outcome the way the rest of this workspace reports build output.

use crate::executor::GraphExecutorObserver;
use colored::Colorize;
use kraken_core::graph::TaskGraph;
use kraken_core::task::{Task, TaskStatus, TaskStatusType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub const TASKS_SKIPPED_DUE_TO_FAILING_DEPENDENCIES_TITLE: &str =
    "Tasks that were not executed due to failing dependencies";

fn colorize_status(text: String, status_type: TaskStatusType) -> String {
    match status_type {
        TaskStatusType::Succeeded | TaskStatusType::UpToDate | TaskStatusType::Started => text.green().to_string(),
        TaskStatusType::Skipped => text.bright_black().to_string(),
        TaskStatusType::Warning => text.yellow().to_string(),
        TaskStatusType::Failed | TaskStatusType::Interrupted | TaskStatusType::Pending => text.red().to_string(),
    }
}

fn status_to_text(status: &TaskStatus) -> String {
    match &status.message {
        Some(message) => format!("{:?} ({message})", status.status_type),
        None => format!("{:?}", status.status_type),
    }
}

fn format_header(title: &str) -> String {
    format!("{}", format!("== {title} ==").bold())
}

/// Prints `>` before a task starts and after it finishes (suppressing the "finished" line for
/// skipped groups/void tasks, which would otherwise be noise), `<` around teardown, and a summary
/// at the end naming every task skipped due to a failing strict dependency.
pub struct DefaultPrintingExecutorObserver {
    execute_prefix: String,
    teardown_prefix: String,
    started: Mutex<HashMap<kraken_core::Address, Instant>>,
}

impl DefaultPrintingExecutorObserver {
    pub fn new() -> Self {
        Self {
            execute_prefix: ">".to_string(),
            teardown_prefix: "<".to_string(),
            started: Mutex::new(HashMap::new()),
        }
    }

    fn should_report(&self, task: &Arc<dyn Task>, status: &TaskStatus) -> bool {
        !(task.as_group().is_some() && matches!(status.status_type, TaskStatusType::Skipped))
    }
}

impl Default for DefaultPrintingExecutorObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphExecutorObserver for DefaultPrintingExecutorObserver {
    fn before_execute_graph(&self, _graph: &TaskGraph) {
        println!();
        println!("{}", format_header("Start build"));
    }

    fn after_execute_graph(&self, graph: &TaskGraph) {
        println!();
        println!("{}", format_header("Build summary"));

        let not_executed: Vec<_> = graph
            .tasks()
            .filter(|task| graph.get_status(&task.address()).is_none())
            .collect();
        if !not_executed.is_empty() {
            println!();
            println!("{}", format_header(TASKS_SKIPPED_DUE_TO_FAILING_DEPENDENCIES_TITLE));
            println!();
            for task in not_executed {
                println!("  {}", task.address().to_string().bright_black());
            }
        }
    }

    fn before_execute_task(&self, task: &Arc<dyn Task>, status: &TaskStatus) {
        self.started.lock().insert(task.address(), Instant::now());
        println!(
            "{} {} {}",
            self.execute_prefix,
            task.address(),
            colorize_status(status_to_text(status), status.status_type)
        );
    }

    fn after_execute_task(&self, task: &Arc<dyn Task>, status: &TaskStatus) {
        if !self.should_report(task, status) {
            return;
        }
        let elapsed = self
            .started
            .lock()
            .remove(&task.address())
            .map(|start| format!(" ({:.2?})", start.elapsed()))
            .unwrap_or_default();
        println!(
            "{} {} {}{}",
            self.execute_prefix,
            task.address(),
            colorize_status(status_to_text(status), status.status_type),
            elapsed
        );
    }

    fn before_teardown_task(&self, task: &Arc<dyn Task>) {
        println!("{} {}", self.teardown_prefix, task.address());
    }

    fn after_teardown_task(&self, task: &Arc<dyn Task>, status: &TaskStatus) {
        println!(
            "{} {} {}",
            self.teardown_prefix,
            task.address(),
            colorize_status(status_to_text(status), status.status_type)
        );
    }
}
