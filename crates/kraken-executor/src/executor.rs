//! Drives a [`TaskGraph`] to completion: repeatedly asks it which tasks are ready, runs them
//! (through a [`TaskExecutor`]), records the result, and tears down background tasks once their
//! last dependant has finished.

use crossbeam::channel::{bounded, Receiver, Sender};
use kraken_core::graph::TaskGraph;
use kraken_core::task::{Task, TaskStatus, TaskStatusType};
use kraken_core::Address;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

/// Observes the progress of a [`DefaultGraphExecutor`] run. Every method has a no-op default, so
/// implementors only override what they care about (see [`crate::observer::DefaultPrintingExecutorObserver`]
/// for the reference implementation).
pub trait GraphExecutorObserver: Send + Sync {
    fn before_execute_graph(&self, _graph: &TaskGraph) {}
    fn after_execute_graph(&self, _graph: &TaskGraph) {}
    fn before_prepare_task(&self, _task: &Arc<dyn Task>) {}
    fn after_prepare_task(&self, _task: &Arc<dyn Task>, _status: &TaskStatus) {}
    fn before_execute_task(&self, _task: &Arc<dyn Task>, _status: &TaskStatus) {}
    fn after_execute_task(&self, _task: &Arc<dyn Task>, _status: &TaskStatus) {}
    fn before_teardown_task(&self, _task: &Arc<dyn Task>) {}
    fn after_teardown_task(&self, _task: &Arc<dyn Task>, _status: &TaskStatus) {}
    fn on_task_output(&self, _task: &Arc<dyn Task>, _chunk: &[u8]) {}
}

/// Runs a single task's `execute`/`teardown`, reporting the outcome through `done` once it is
/// known. Implementations may run the call inline or hand it off to a worker.
pub trait TaskExecutor: Send + Sync {
    fn execute_task(&self, task: Arc<dyn Task>, done: Box<dyn FnOnce(TaskStatus) + Send>);
    fn teardown_task(&self, task: Arc<dyn Task>, done: Box<dyn FnOnce(TaskStatus) + Send>);
}

enum Job {
    Execute(Arc<dyn Task>, Box<dyn FnOnce(TaskStatus) + Send>),
    Teardown(Arc<dyn Task>, Box<dyn FnOnce(TaskStatus) + Send>),
}

/// Runs tasks on a fixed pool of worker threads fed by a bounded [`crossbeam::channel`] -- a
/// right-sized stand-in for a full work-stealing queue, since the driver only ever needs "workers
/// execute, completions flow back".
pub struct DefaultTaskExecutor {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl DefaultTaskExecutor {
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get().max(1))
    }

    pub fn with_workers(worker_count: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(worker_count * 4);
        let workers = (0..worker_count)
            .map(|_| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::spawn(move || {
                    for job in receiver {
                        match job {
                            Job::Execute(task, done) => done(Self::call(|| task.execute())),
                            Job::Teardown(task, done) => done(Self::call(|| {
                                task.teardown().map(|status| status.unwrap_or_else(|| TaskStatus::succeeded(None)))
                            })),
                        }
                    }
                })
            })
            .collect();
        Self { sender, workers }
    }

    fn call(f: impl FnOnce() -> kraken_core::Result<TaskStatus>) -> TaskStatus {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => TaskStatus::failed(Some(e.to_string())),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                TaskStatus::failed(Some(format!("unhandled panic: {message}")))
            }
        }
    }
}

impl Default for DefaultTaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DefaultTaskExecutor {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl TaskExecutor for DefaultTaskExecutor {
    fn execute_task(&self, task: Arc<dyn Task>, done: Box<dyn FnOnce(TaskStatus) + Send>) {
        if !task.core().tags("skip").is_empty() {
            panic!("tasks tagged to be skipped must not be passed into the task executor: {}", task.address());
        }
        self.sender
            .send(Job::Execute(task, done))
            .expect("worker pool shut down before submitting job");
    }

    fn teardown_task(&self, task: Arc<dyn Task>, done: Box<dyn FnOnce(TaskStatus) + Send>) {
        self.sender
            .send(Job::Teardown(task, done))
            .expect("worker pool shut down before submitting job");
    }
}

/// Tracks background ([`TaskStatusType::Started`]) tasks against the set of successors that
/// still need to finish before the background task can be torn down.
#[derive(Default)]
struct TaskRememberer {
    outstanding: HashMap<Address, HashSet<Address>>,
    tasks: HashMap<Address, Arc<dyn Task>>,
}

impl TaskRememberer {
    fn remember(&mut self, task: Arc<dyn Task>, successors: HashSet<Address>) {
        let address = task.address();
        self.tasks.insert(address.clone(), task);
        self.outstanding.insert(address, successors);
    }

    /// `task` has just reached a terminal status (or finished teardown). Returns every
    /// background task that no longer has any outstanding successor, and so is ready itself to
    /// be torn down.
    fn done(&mut self, task: &Arc<dyn Task>) -> Vec<Arc<dyn Task>> {
        let address = task.address();
        let mut newly_ready = Vec::new();
        for successors in self.outstanding.values_mut() {
            successors.remove(&address);
        }
        let finished: Vec<Address> = self
            .outstanding
            .iter()
            .filter(|(_, successors)| successors.is_empty())
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in finished {
            self.outstanding.remove(&addr);
            if let Some(task) = self.tasks.remove(&addr) {
                newly_ready.push(task);
            }
        }
        newly_ready
    }

    fn forget_all(&mut self) -> Vec<Arc<dyn Task>> {
        self.outstanding.clear();
        self.tasks.drain().map(|(_, task)| task).collect()
    }
}

/// The straightforward [`TaskGraph`] driver: loop over [`TaskGraph::ready`], dispatch what's
/// ready to the [`TaskExecutor`], and wait for that batch to report back before asking again.
pub struct DefaultGraphExecutor {
    task_executor: Box<dyn TaskExecutor>,
}

enum Phase {
    Execute,
    Teardown,
}

impl DefaultGraphExecutor {
    pub fn new(task_executor: impl TaskExecutor + 'static) -> Self {
        Self {
            task_executor: Box::new(task_executor),
        }
    }

    pub fn execute_graph(&self, graph: &mut TaskGraph, observer: &dyn GraphExecutorObserver) {
        let mut remember = TaskRememberer::default();
        let mut interrupted = false;
        let (tx, rx): (Sender<(Arc<dyn Task>, Phase, TaskStatus)>, Receiver<(Arc<dyn Task>, Phase, TaskStatus)>) = bounded(64);

        observer.before_execute_graph(graph);

        while !graph.is_complete() && !interrupted {
            let ready = graph.ready();
            if ready.is_empty() {
                break;
            }

            let mut inflight = 0usize;
            for task in ready {
                if interrupted {
                    break;
                }
                let skip_tags = task.core().tags("skip");
                if !skip_tags.is_empty() {
                    let reason = skip_tags.iter().map(|t| t.reason.clone()).collect::<Vec<_>>().join("; ");
                    self.finish_execute(graph, observer, &mut remember, &mut interrupted, task, TaskStatus::skipped(Some(reason)));
                    continue;
                }

                observer.before_prepare_task(&task);
                let prepared = task.prepare().unwrap_or_else(|e| TaskStatus::failed(Some(e.to_string())));
                observer.after_prepare_task(&task, &prepared);

                if matches!(prepared.status_type, TaskStatusType::Pending) {
                    observer.before_execute_task(&task, &prepared);
                    inflight += 1;
                    let tx = tx.clone();
                    let reply_task = task.clone();
                    self.task_executor.execute_task(
                        task,
                        Box::new(move |status| {
                            let _ = tx.send((reply_task, Phase::Execute, status));
                        }),
                    );
                } else {
                    self.finish_execute(graph, observer, &mut remember, &mut interrupted, task, prepared);
                }
            }

            for _ in 0..inflight {
                if let Ok((task, _phase, status)) = rx.recv() {
                    self.finish_execute(graph, observer, &mut remember, &mut interrupted, task, status);
                }
            }
        }

        self.run_teardown(graph, observer, &mut remember, &mut interrupted, remember_drain(&mut remember));
        observer.after_execute_graph(graph);
    }

    fn finish_execute(
        &self,
        graph: &mut TaskGraph,
        observer: &dyn GraphExecutorObserver,
        remember: &mut TaskRememberer,
        interrupted: &mut bool,
        task: Arc<dyn Task>,
        status: TaskStatus,
    ) {
        graph.set_status(&task.address(), status.clone());
        observer.after_execute_task(&task, &status);
        if matches!(status.status_type, TaskStatusType::Started) {
            let successors: HashSet<Address> = graph.successors(&task.address()).iter().map(|t| t.address()).collect();
            remember.remember(task, successors);
        } else {
            if matches!(status.status_type, TaskStatusType::Interrupted) {
                *interrupted = true;
            }
            let newly_ready = remember.done(&task);
            self.run_teardown(graph, observer, remember, interrupted, newly_ready);
        }
    }

    fn run_teardown(
        &self,
        graph: &mut TaskGraph,
        observer: &dyn GraphExecutorObserver,
        remember: &mut TaskRememberer,
        interrupted: &mut bool,
        tasks: Vec<Arc<dyn Task>>,
    ) {
        if tasks.is_empty() {
            return;
        }
        let (tx, rx): (Sender<(Arc<dyn Task>, Phase, TaskStatus)>, Receiver<(Arc<dyn Task>, Phase, TaskStatus)>) =
            bounded(tasks.len().max(1));
        for task in &tasks {
            observer.before_teardown_task(task);
            let tx = tx.clone();
            let reply_task = task.clone();
            self.task_executor.teardown_task(
                task.clone(),
                Box::new(move |status| {
                    let _ = tx.send((reply_task, Phase::Teardown, status));
                }),
            );
        }
        for _ in 0..tasks.len() {
            if let Ok((task, _phase, status)) = rx.recv() {
                if matches!(status.status_type, TaskStatusType::Interrupted) {
                    *interrupted = true;
                }
                graph.set_status(&task.address(), status.clone());
                observer.after_teardown_task(&task, &status);
                let next = remember.done(&task);
                self.run_teardown(graph, observer, remember, interrupted, next);
            }
        }
    }
}

fn remember_drain(remember: &mut TaskRememberer) -> Vec<Arc<dyn Task>> {
    remember.forget_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kraken_core::address::Address as Addr;
    use kraken_core::task::{RelationshipMode, TaskCore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        core: TaskCore,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Task for CountingTask {
        fn core(&self) -> &TaskCore {
            &self.core
        }

        fn execute(&self) -> kraken_core::Result<TaskStatus> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Ok(TaskStatus::failed(None))
            } else {
                Ok(TaskStatus::succeeded(None))
            }
        }
    }

    fn addr(s: &str) -> Addr {
        s.parse().unwrap()
    }

    #[test]
    fn executes_every_task_in_dependency_order() {
        let runs = Arc::new(AtomicUsize::new(0));
        let a = Arc::new(CountingTask {
            core: TaskCore::new(addr(":a")),
            runs: runs.clone(),
            fail: false,
        });
        let b = Arc::new(CountingTask {
            core: TaskCore::new(addr(":b")),
            runs: runs.clone(),
            fail: false,
        });
        b.core().depends_on_task(a.clone(), RelationshipMode::Strict);

        let no_resolve = |_: &Addr| -> kraken_core::Result<Vec<Arc<dyn Task>>> { Ok(Vec::new()) };
        let mut graph = TaskGraph::build(&[b.clone() as Arc<dyn Task>], no_resolve).unwrap();

        struct Noop;
        impl GraphExecutorObserver for Noop {}

        let executor = DefaultGraphExecutor::new(DefaultTaskExecutor::with_workers(2));
        executor.execute_graph(&mut graph, &Noop);

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(graph.is_complete());
    }

    #[test]
    fn a_failed_task_blocks_its_strict_dependant() {
        let runs = Arc::new(AtomicUsize::new(0));
        let a = Arc::new(CountingTask {
            core: TaskCore::new(addr(":a")),
            runs: runs.clone(),
            fail: true,
        });
        let b = Arc::new(CountingTask {
            core: TaskCore::new(addr(":b")),
            runs: runs.clone(),
            fail: false,
        });
        b.core().depends_on_task(a.clone(), RelationshipMode::Strict);

        let no_resolve = |_: &Addr| -> kraken_core::Result<Vec<Arc<dyn Task>>> { Ok(Vec::new()) };
        let mut graph = TaskGraph::build(&[b.clone() as Arc<dyn Task>], no_resolve).unwrap();

        struct Noop;
        impl GraphExecutorObserver for Noop {}

        let executor = DefaultGraphExecutor::new(DefaultTaskExecutor::with_workers(1));
        executor.execute_graph(&mut graph, &Noop);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!graph.is_complete());
    }
}
