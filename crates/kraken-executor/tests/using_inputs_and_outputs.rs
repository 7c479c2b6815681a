use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kraken_core::property::Property;
use kraken_core::task::{RelationshipMode, Task, TaskCore, TaskStatus};
use kraken_core::{Address, Context};
use kraken_executor::executor::{DefaultGraphExecutor, DefaultTaskExecutor, GraphExecutorObserver};

/// A task whose input is wired to a producer's output, so scheduling must run the producer
/// first even though nothing declared that order directly (it's derived from the property).
struct ProducerTask {
    core: TaskCore,
    output: Property<String>,
    order: Arc<Mutex<Vec<Address>>>,
}

impl Task for ProducerTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) -> kraken_core::Result<TaskStatus> {
        self.order.lock().unwrap().push(self.address());
        self.output.set("produced".to_string())?;
        Ok(TaskStatus::succeeded(None))
    }
}

struct ConsumerTask {
    core: TaskCore,
    input: Property<String>,
    order: Arc<Mutex<Vec<Address>>>,
}

impl Task for ConsumerTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn execute(&self) -> kraken_core::Result<TaskStatus> {
        self.order.lock().unwrap().push(self.address());
        let _ = self.input.get()?;
        Ok(TaskStatus::succeeded(None))
    }
}

struct Noop;
impl GraphExecutorObserver for Noop {}

#[test]
fn task_ordered_by_dependencies() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-inputs-and-outputs"));
    let root = ctx.root_project();
    let order = Arc::new(Mutex::new(Vec::new()));

    let producer = Arc::new(ProducerTask {
        core: TaskCore::new(":task1".parse().unwrap()),
        output: Property::new_output(None, "output"),
        order: order.clone(),
    });
    let consumer = Arc::new(ConsumerTask {
        core: TaskCore::new(":task2".parse().unwrap()),
        input: producer.output.clone(),
        order: order.clone(),
    });
    consumer.core().depends_on_task(producer.clone(), RelationshipMode::Strict);

    root.add_task(producer.clone()).unwrap();
    root.add_task(consumer.clone()).unwrap();
    ctx.finalize().unwrap();

    let mut graph = ctx.get_build_graph(Some(&[":task2".to_string()])).unwrap();

    let executor = DefaultGraphExecutor::new(DefaultTaskExecutor::with_workers(1));
    executor.execute_graph(&mut graph, &Noop);

    assert!(graph.is_complete());
    let ran: Vec<String> = order.lock().unwrap().iter().map(|a| a.to_string()).collect();
    assert_eq!(ran, vec![":task1".to_string(), ":task2".to_string()]);
}
