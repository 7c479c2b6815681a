#![deny(rustdoc::broken_intra_doc_links)]

//! `kraken-executor` walks a [`kraken_core::graph::TaskGraph`] to completion: it asks the graph
//! which tasks are ready, hands them to a worker pool, and feeds the results back until every
//! requested task has run (or the build gives up on a failure).
//!
//! Binaries wanting a Kraken CLI should use [`KrakenExecutorArgs`] and [`kraken_main`].

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use kraken_core::logging::LoggingArgs;
use kraken_core::Context;

use crate::executor::{DefaultGraphExecutor, DefaultTaskExecutor};
use crate::observer::DefaultPrintingExecutorObserver;

pub mod error;
pub mod executor;
pub mod observer;

pub use error::{ExecutorError, ExecutorResult};

/// The args to run a kraken build.
#[derive(Debug, Parser)]
#[clap(about)]
pub struct KrakenExecutorArgs {
    /// Tasks to be run. Empty selects the default tasks of the root project.
    pub tasks: Vec<String>,
    /// The directory the build is rooted at. Defaults to the current directory.
    #[clap(long, default_value = ".")]
    pub directory: PathBuf,
    /// Log level to run the build in.
    #[clap(flatten)]
    pub log_level: LoggingArgs,
    /// The number of workers to use. Defaults to the number of cpus on the host.
    #[clap(long, short = 'J')]
    #[clap(default_value_t = NonZeroUsize::new(num_cpus::get()).expect("number of cpus should never be 0"))]
    #[clap(default_value_if("no-parallel", None, Some("1")))]
    pub workers: NonZeroUsize,
    /// Don't run tasks in parallel.
    #[clap(long)]
    #[clap(conflicts_with = "workers")]
    pub no_parallel: bool,
}

impl KrakenExecutorArgs {
    /// Simulates parsing args from a single command-line string; mainly useful in tests.
    pub fn command_line<S: AsRef<str>>(cmd: S) -> Self {
        <Self as FromIterator<_>>::from_iter(cmd.as_ref().split_whitespace())
    }
}

impl<S: AsRef<str>> FromIterator<S> for KrakenExecutorArgs {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut args = vec![String::new()];
        args.extend(iter.into_iter().map(|s: S| s.as_ref().to_string()));
        KrakenExecutorArgs::parse_from(args)
    }
}

/// Resolves the requested tasks out of the project rooted at `args.directory`, builds the task
/// graph, and drives it to completion with a worker pool sized by `args.workers`.
pub fn kraken_main(args: KrakenExecutorArgs) -> ExecutorResult<()> {
    args.log_level.init_root_logger();

    let context = Context::new(args.directory);
    let selectors = if args.tasks.is_empty() { None } else { Some(args.tasks.as_slice()) };
    let mut graph = context.get_build_graph(selectors)?;

    let task_executor = DefaultTaskExecutor::with_workers(args.workers.get());
    let graph_executor = DefaultGraphExecutor::new(task_executor);
    let observer = DefaultPrintingExecutorObserver::new();

    graph_executor.execute_graph(&mut graph, &observer);

    if graph.is_complete() {
        Ok(())
    } else {
        Err(ExecutorError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_parallel() {
        let args = KrakenExecutorArgs::command_line("--no-parallel");
        assert!(args.no_parallel);
        assert_eq!(args.workers.get(), 1);
    }

    #[test]
    fn arbitrary_workers() {
        let args = KrakenExecutorArgs::command_line("--workers 13");
        assert_eq!(args.workers.get(), 13);
        assert!(KrakenExecutorArgs::try_parse_from(["", "-J", "0"]).is_err());
    }

    #[test]
    fn default_workers_is_num_cpus() {
        let args = KrakenExecutorArgs::command_line("");
        assert_eq!(args.workers.get(), num_cpus::get());
    }

    #[test]
    fn workers_and_no_parallel_conflicts() {
        assert!(KrakenExecutorArgs::try_parse_from(["", "--workers", "12", "--no-parallel"]).is_err());
    }
}
