//! The context owns the project tree, the event bus used to observe build progress, and the
//! logic for turning task selector strings into concrete [`Task`]s.

use crate::address::resolver::{resolve_address, AddressSpace, Addressable};
use crate::address::{Address, Element};
use crate::error::{KrakenError, Result};
use crate::graph::TaskGraph;
use crate::project::Project;
use crate::task::Task;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// A project or task, addressed uniformly so task selectors can be resolved against both.
#[derive(Clone)]
pub enum Entity {
    Project(Arc<Project>),
    Task(Arc<dyn Task>),
}

impl Addressable for Entity {
    fn address(&self) -> Address {
        match self {
            Entity::Project(p) => p.address(),
            Entity::Task(t) => t.address(),
        }
    }
}

/// Events published over the course of a build, for progress reporting and plugins (see
/// [`Context::listen`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEventType {
    ContextFinalized,
    BuildStarted,
    BuildFinished,
}

#[derive(Debug, Clone)]
pub struct ContextEvent {
    pub event_type: ContextEventType,
    pub project: Option<Address>,
}

type Listener = Box<dyn Fn(&ContextEvent) + Send + Sync>;

/// Owns the project tree for a single build invocation.
pub struct Context {
    root: Arc<Project>,
    build_directory: PathBuf,
    listeners: RwLock<Vec<Listener>>,
    finalized: RwLock<bool>,
}

impl Context {
    pub fn new(build_directory: PathBuf) -> Arc<Self> {
        let root = Project::root(build_directory.clone());
        Arc::new(Self {
            root,
            build_directory,
            listeners: RwLock::new(Vec::new()),
            finalized: RwLock::new(false),
        })
    }

    pub fn root_project(&self) -> Arc<Project> {
        self.root.clone()
    }

    pub fn build_directory(&self) -> &PathBuf {
        &self.build_directory
    }

    /// Registers a callback invoked for every [`ContextEvent`] published during the build.
    pub fn listen(&self, listener: impl Fn(&ContextEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn trigger(&self, event_type: ContextEventType, project: Option<Address>) {
        for listener in self.listeners.read().iter() {
            listener(&ContextEvent { event_type, project });
        }
    }

    fn find_project(&self, address: &Address) -> Option<Arc<Project>> {
        if !address.is_absolute() {
            return None;
        }
        let mut current = self.root.clone();
        for element in address.elements() {
            current = current.subproject_named(element.value())?;
        }
        Some(current)
    }

    /// Rewrites a task selector the way a shell expands a bare word into a path: a single bare
    /// element becomes a recursive search (`foo` -> `**:foo`), and anything not already absolute
    /// is resolved relative to `relative_to` and normalized.
    fn rewrite_selector(&self, address: Address, relative_to: &Arc<Project>) -> Address {
        let address = if !address.is_absolute()
            && !address.is_container()
            && address.len() == 1
            && !address.get(0).is_some_and(Element::is_recursive_wildcard)
        {
            Address::recursive_wildcard().concat(&address)
        } else {
            address
        };
        if address.is_absolute() {
            address
        } else {
            relative_to.address().concat(&address).normalize(true)
        }
    }

    fn expand_entity(&self, entity: Entity) -> Vec<Arc<dyn Task>> {
        match entity {
            Entity::Task(task) => vec![task],
            Entity::Project(project) => project
                .tasks()
                .into_iter()
                .filter(|t| t.core().is_default())
                .collect(),
        }
    }

    /// Resolves task selectors (e.g. `:a:build`, `test`, `**:lint`) into concrete tasks, relative
    /// to `relative_to` when a selector is not absolute. `None` selects the default behavior: the
    /// default-enabled tasks of `relative_to` plus of every reachable subproject.
    ///
    /// `set_selected=true` marks tasks a selector matched *directly* as selected (see
    /// [`crate::task::TaskCore::set_selected`]); tasks only pulled in because they're a project's
    /// default-enabled tasks are left alone, so callers can tell "the user asked for this" apart
    /// from "this ran because its project defaults to running it".
    pub fn resolve_tasks(
        &self,
        selectors: Option<&[String]>,
        relative_to: &Arc<Project>,
        set_selected: bool,
    ) -> Result<Vec<Arc<dyn Task>>> {
        let parsed: Vec<Address> = match selectors {
            Some(sels) => sels.iter().map(|s| s.parse()).collect::<Result<_>>()?,
            None => vec![
                Address::current().set_container(true)?,
                Address::recursive_wildcard().set_container(true)?,
            ],
        };

        let mut out: Vec<Arc<dyn Task>> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for selector in parsed {
            let rewritten = self.rewrite_selector(selector, relative_to);
            let is_bare_recursive_wildcard = rewritten.len() == 1
                && rewritten.get(0).is_some_and(Element::is_recursive_wildcard)
                && rewritten.is_container();

            match resolve_address(self, Entity::Project(relative_to.clone()), &rewritten) {
                Ok(result) => {
                    for entity in result.matches() {
                        let directly_matched = matches!(entity, Entity::Task(_));
                        for task in self.expand_entity(entity) {
                            if set_selected && directly_matched {
                                task.core().set_selected(true);
                            }
                            let address = task.address();
                            if seen.insert(address) {
                                out.push(task);
                            }
                        }
                    }
                }
                Err(KrakenError::AddressResolution(_)) if is_bare_recursive_wildcard => {
                    // A project with no subprojects legitimately yields nothing for `**:`.
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Calls [`Task::finalize`] on every task in the tree exactly once, then publishes
    /// [`ContextEventType::ContextFinalized`]. Idempotent.
    pub fn finalize(&self) -> Result<()> {
        if *self.finalized.read() {
            return Ok(());
        }
        finalize_recursive(&self.root);
        *self.finalized.write() = true;
        self.trigger(ContextEventType::ContextFinalized, None);
        Ok(())
    }

    /// Builds the [`TaskGraph`] for the resolved set of tasks, populated with every relationship
    /// (declared and property-inferred) and trimmed to what is reachable.
    pub fn get_build_graph(&self, selectors: Option<&[String]>) -> Result<TaskGraph> {
        let tasks = self.resolve_tasks(selectors, &self.root, true)?;
        let graph = TaskGraph::build(&tasks, |address| self.tasks_for_relationship(address))?;
        graph.trim(&tasks)
    }

    fn tasks_for_relationship(&self, address: &Address) -> Result<Vec<Arc<dyn Task>>> {
        self.resolve_tasks(Some(&[address.to_string()]), &self.root, false)
    }
}

fn finalize_recursive(project: &Arc<Project>) {
    for task in project.tasks() {
        task.finalize();
    }
    for sub in project.subprojects() {
        finalize_recursive(&sub);
    }
}

impl AddressSpace<Entity> for Context {
    fn root(&self) -> Entity {
        Entity::Project(self.root.clone())
    }

    fn parent(&self, entity: &Entity) -> Option<Entity> {
        match entity {
            Entity::Project(p) => p.parent().map(Entity::Project),
            Entity::Task(t) => {
                let parent_address = t.address().parent().ok()?;
                self.find_project(&parent_address).map(Entity::Project)
            }
        }
    }

    fn children(&self, entity: &Entity) -> Vec<Entity> {
        match entity {
            Entity::Task(_) => vec![],
            Entity::Project(p) => p
                .tasks()
                .into_iter()
                .map(Entity::Task)
                .chain(p.subprojects().into_iter().map(Entity::Project))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bare_name_searches_recursively() {
        let ctx = Context::new(PathBuf::from("/tmp/build"));
        let root = ctx.root_project();
        let tasks = ctx.resolve_tasks(Some(&["check".to_string()]), &root, false).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].address().to_string(), ":check");
    }

    #[test]
    fn resolve_container_expands_to_defaults() {
        let ctx = Context::new(PathBuf::from("/tmp/build"));
        let root = ctx.root_project();
        let tasks = ctx.resolve_tasks(Some(&[":".to_string()]), &root, false).unwrap();
        let names: std::collections::HashSet<_> = tasks.iter().map(|t| t.address().to_string()).collect();
        assert!(names.contains(":check"));
        assert!(names.contains(":gen"));
        assert!(!names.contains(":build"));
    }

    #[test]
    fn resolve_none_falls_back_to_current_and_recursive() {
        let ctx = Context::new(PathBuf::from("/tmp/build"));
        let root = ctx.root_project();
        let tasks = ctx.resolve_tasks(None, &root, false).unwrap();
        assert!(!tasks.is_empty());
    }

    #[test]
    fn set_selected_marks_only_directly_matched_tasks() {
        let ctx = Context::new(PathBuf::from("/tmp/build"));
        let root = ctx.root_project();
        let tasks = ctx.resolve_tasks(Some(&["check".to_string()]), &root, true).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].core().is_selected());

        // A project-container selector expands to default tasks, none of which were named
        // directly -- they must not come back marked selected.
        let ctx = Context::new(PathBuf::from("/tmp/build-defaults"));
        let root = ctx.root_project();
        let tasks = ctx.resolve_tasks(Some(&[":".to_string()]), &root, true).unwrap();
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|t| !t.core().is_selected()));
    }
}
