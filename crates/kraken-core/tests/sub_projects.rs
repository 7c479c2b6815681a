use std::path::PathBuf;
use std::sync::Arc;

use kraken_core::task::{Task, TaskCore, TaskStatus};
use kraken_core::Context;

struct Noop(TaskCore);

impl Task for Noop {
    fn core(&self) -> &TaskCore {
        &self.0
    }

    fn execute(&self) -> kraken_core::Result<TaskStatus> {
        Ok(TaskStatus::succeeded(None))
    }
}

#[test]
fn inter_project_task_resolution() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-sub-projects"));
    let root = ctx.root_project();

    let child1 = kraken_core::Project::child(&root, "child1").unwrap();
    let child2 = kraken_core::Project::child(&root, "child2").unwrap();
    assert!(root.has_subproject("child1"));
    assert!(root.has_subproject("child2"));

    let create_file = Arc::new(Noop(TaskCore::new(":child1:createFile".parse().unwrap())));
    child1.add_task(create_file.clone()).unwrap();

    // child2 selects child1's task by absolute address, with no common parent reference needed.
    let resolved = ctx.resolve_tasks(Some(&[":child1:createFile".to_string()]), &child2, false).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].address().to_string(), ":child1:createFile");
}

#[test]
fn child_project_nesting_is_reflected_in_addresses() {
    let ctx = Context::new(PathBuf::from("/tmp/kraken-test-sub-projects-nesting"));
    let root = ctx.root_project();
    let child = kraken_core::Project::child(&root, "child").unwrap();
    let grandchild = kraken_core::Project::child(&child, "grandchild").unwrap();

    assert_eq!(grandchild.address().to_string(), ":child:grandchild");
    assert_eq!(grandchild.parent().unwrap().address().to_string(), ":child");
}
