use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kraken_core::task::{RelationshipMode, Task, TaskCore, TaskStatus};
use kraken_core::{Address, Context, KrakenError};
use kraken_executor::executor::{DefaultGraphExecutor, DefaultTaskExecutor, GraphExecutorObserver};

struct RecordingTask {
    core: TaskCore,
    order: Arc<Mutex<Vec<Address>>>,
}

impl Task for RecordingTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) -> kraken_core::Result<TaskStatus> {
        self.order.lock().unwrap().push(self.address());
        Ok(TaskStatus::succeeded(None))
    }
}

fn task(address: &str, order: &Arc<Mutex<Vec<Address>>>) -> Arc<RecordingTask> {
    Arc::new(RecordingTask {
        core: TaskCore::new(address.parse().unwrap()),
        order: order.clone(),
    })
}

struct Noop;
impl GraphExecutorObserver for Noop {}

#[test]
fn resolve_and_execute_project() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-basic-project"));
    let root = ctx.root_project();
    let order = Arc::new(Mutex::new(Vec::new()));

    let task1 = task(":task1", &order);
    let task2 = task(":task2", &order);
    let task3 = task(":task3", &order);
    task1.core().depends_on_task(task2.clone(), RelationshipMode::Strict);
    task2.core().depends_on_task(task3.clone(), RelationshipMode::Strict);

    root.add_task(task1.clone()).unwrap();
    root.add_task(task2.clone()).unwrap();
    root.add_task(task3.clone()).unwrap();
    ctx.finalize().unwrap();

    let mut graph = ctx
        .get_build_graph(Some(&[":task1".to_string(), ":task2".to_string(), ":task3".to_string()]))
        .unwrap();

    let executor = DefaultGraphExecutor::new(DefaultTaskExecutor::with_workers(2));
    executor.execute_graph(&mut graph, &Noop);

    assert!(graph.is_complete(), "all three tasks should run");
    let ran = order.lock().unwrap();
    assert_eq!(ran.len(), 3, "all tasks should run exactly once");
    let pos = |a: &str| ran.iter().position(|x| x.to_string() == a).unwrap();
    assert!(pos(":task3") < pos(":task2"), "task3 must run before task2");
    assert!(pos(":task2") < pos(":task1"), "task2 must run before task1");
}

#[test]
fn detect_task_cycles() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-cycles"));
    let root = ctx.root_project();
    let order = Arc::new(Mutex::new(Vec::new()));

    let task1 = task(":task1", &order);
    let task2 = task(":task2", &order);
    let task3 = task(":task3", &order);
    task1.core().depends_on_task(task2.clone(), RelationshipMode::Strict);
    task2.core().depends_on_task(task3.clone(), RelationshipMode::Strict);
    task3.core().depends_on_task(task1.clone(), RelationshipMode::Strict);

    root.add_task(task1.clone()).unwrap();
    root.add_task(task2.clone()).unwrap();
    root.add_task(task3.clone()).unwrap();
    ctx.finalize().unwrap();

    let result = ctx.get_build_graph(Some(&[":task1".to_string(), ":task2".to_string(), ":task3".to_string()]));

    match result {
        Err(KrakenError::Other(message)) => {
            assert!(message.contains("cycle"), "unexpected error: {message}");
        }
        Ok(_) => panic!("expected a dependency cycle error, got a graph instead"),
        Err(e) => panic!("expected a dependency cycle error, got {e}"),
    }
}
