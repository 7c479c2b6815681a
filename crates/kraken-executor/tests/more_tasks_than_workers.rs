use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kraken_core::task::{RelationshipMode, Task, TaskCore, TaskStatus};
use kraken_core::Context;
use kraken_executor::executor::{DefaultGraphExecutor, DefaultTaskExecutor, GraphExecutorObserver};

struct CountingTask {
    core: TaskCore,
    runs: Arc<AtomicUsize>,
}

impl Task for CountingTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) -> kraken_core::Result<TaskStatus> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(TaskStatus::succeeded(None))
    }
}

struct Noop;
impl GraphExecutorObserver for Noop {}

#[test]
fn can_handle_more_tasks_than_workers() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-more-tasks-than-workers"));
    let root = ctx.root_project();
    let runs = Arc::new(AtomicUsize::new(0));

    let max_workers = (num_cpus::get() / 2).max(1);
    let join_task = Arc::new(CountingTask {
        core: TaskCore::new(":joinTask".parse().unwrap()),
        runs: runs.clone(),
    });

    let mut selectors = vec![":joinTask".to_string()];
    for i in 0..(max_workers * 4) {
        let minor = Arc::new(CountingTask {
            core: TaskCore::new(format!(":minorTask{i}").parse().unwrap()),
            runs: runs.clone(),
        });
        join_task.core().depends_on_task(minor.clone(), RelationshipMode::Strict);
        root.add_task(minor.clone()).unwrap();
        selectors.push(format!(":minorTask{i}"));
    }
    root.add_task(join_task.clone()).unwrap();
    ctx.finalize().unwrap();

    let mut graph = ctx.get_build_graph(Some(&selectors)).unwrap();

    let executor = DefaultGraphExecutor::new(DefaultTaskExecutor::with_workers(max_workers));
    executor.execute_graph(&mut graph, &Noop);

    assert!(graph.is_complete());
    assert_eq!(runs.load(Ordering::SeqCst), max_workers * 4 + 1);
}
