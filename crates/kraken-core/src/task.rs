//! Tasks: the unit of work in a kraken build. A task moves through finalization, preparation,
//! execution and (for background tasks) teardown; see [`TaskStatusType`] for the states an
//! execution can end in.

use crate::address::Address;
use crate::property::AnyProperty;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The outcome of a single `prepare`/`execute`/`teardown` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatusType {
    /// Pending execution; only legal as the return of [`Task::prepare`].
    Pending,
    Failed,
    Interrupted,
    /// Only legal as the return of [`Task::execute`].
    Succeeded,
    /// A background task has started and needs [`Task::teardown`] later.
    Started,
    Skipped,
    UpToDate,
    Warning,
}

impl TaskStatusType {
    pub fn is_ok(self) -> bool {
        !self.is_not_ok()
    }

    pub fn is_not_ok(self) -> bool {
        matches!(self, Self::Pending | Self::Failed | Self::Interrupted)
    }
}

/// A status paired with an optional human-readable message.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub status_type: TaskStatusType,
    pub message: Option<String>,
}

macro_rules! status_ctor {
    ($name:ident, $variant:ident) => {
        pub fn $name(message: impl Into<Option<String>>) -> Self {
            Self {
                status_type: TaskStatusType::$variant,
                message: message.into(),
            }
        }
    };
}

impl TaskStatus {
    status_ctor!(pending, Pending);
    status_ctor!(failed, Failed);
    status_ctor!(interrupted, Interrupted);
    status_ctor!(succeeded, Succeeded);
    status_ctor!(started, Started);
    status_ctor!(skipped, Skipped);
    status_ctor!(up_to_date, UpToDate);
    status_ctor!(warning, Warning);

    pub fn is_ok(&self) -> bool {
        self.status_type.is_ok()
    }

    pub fn is_not_ok(&self) -> bool {
        self.status_type.is_not_ok()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.status_type)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// A label attached to a task explaining why it was tagged (e.g. the built-in `skip` tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskTag {
    pub name: String,
    pub reason: String,
    pub origin: Option<String>,
}

/// How strongly a declared relationship constrains scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipMode {
    /// The dependent task cannot run until the dependency has succeeded.
    Strict,
    /// Only the relative order is constrained; a failure of the dependency does not block the
    /// dependent from running.
    OrderOnly,
}

/// A relationship to another task, resolved to a concrete [`Task`].
#[derive(Clone)]
pub struct TaskRelationship {
    pub other_task: Arc<dyn Task>,
    pub strict: bool,
    pub inverse: bool,
}

/// A relationship that may still need resolving against the current project (when declared by
/// address rather than by task reference).
#[derive(Clone)]
enum RelationshipTarget {
    Task(Arc<dyn Task>),
    Address(Address),
}

#[derive(Clone)]
struct DeclaredRelationship {
    target: RelationshipTarget,
    strict: bool,
    inverse: bool,
}

/// State shared by every task, regardless of concrete implementation. Embed this in your task
/// struct and delegate [`Task::core`] to it; see [`VoidTask`] for the canonical example.
pub struct TaskCore {
    address: Address,
    description: RwLock<Option<String>>,
    default: RwLock<bool>,
    selected: RwLock<bool>,
    tags: RwLock<HashSet<TaskTag>>,
    relationships: RwLock<Vec<DeclaredRelationship>>,
}

impl TaskCore {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            description: RwLock::new(None),
            default: RwLock::new(false),
            selected: RwLock::new(false),
            tags: RwLock::new(HashSet::new()),
            relationships: RwLock::new(Vec::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write() = Some(description.into());
    }

    pub fn is_default(&self) -> bool {
        *self.default.read()
    }

    pub fn set_default(&self, default: bool) {
        *self.default.write() = default;
    }

    pub fn is_selected(&self) -> bool {
        *self.selected.read()
    }

    pub fn set_selected(&self, selected: bool) {
        *self.selected.write() = selected;
    }

    pub fn add_tag(&self, name: impl Into<String>, reason: impl Into<String>, origin: Option<String>) {
        self.tags.write().insert(TaskTag {
            name: name.into(),
            reason: reason.into(),
            origin,
        });
    }

    pub fn tags(&self, name: &str) -> Vec<TaskTag> {
        self.tags.read().iter().filter(|t| t.name == name).cloned().collect()
    }

    pub fn remove_tag(&self, tag: &TaskTag) {
        self.tags.write().remove(tag);
    }

    /// Declares a dependency on `task`, by address or by direct reference. Addresses are
    /// resolved lazily, in [`Task::relationships`], once a project context is available.
    pub fn depends_on_task(&self, task: Arc<dyn Task>, mode: RelationshipMode) {
        self.relationships.write().push(DeclaredRelationship {
            target: RelationshipTarget::Task(task),
            strict: mode == RelationshipMode::Strict,
            inverse: false,
        });
    }

    pub fn depends_on_address(&self, address: Address, mode: RelationshipMode) {
        self.relationships.write().push(DeclaredRelationship {
            target: RelationshipTarget::Address(address),
            strict: mode == RelationshipMode::Strict,
            inverse: false,
        });
    }

    pub fn required_by_task(&self, task: Arc<dyn Task>, mode: RelationshipMode) {
        self.relationships.write().push(DeclaredRelationship {
            target: RelationshipTarget::Task(task),
            strict: mode == RelationshipMode::Strict,
            inverse: true,
        });
    }

    pub fn required_by_address(&self, address: Address, mode: RelationshipMode) {
        self.relationships.write().push(DeclaredRelationship {
            target: RelationshipTarget::Address(address),
            strict: mode == RelationshipMode::Strict,
            inverse: true,
        });
    }

    /// Resolves declared relationships into concrete [`TaskRelationship`]s. Addresses are
    /// resolved through `resolve` (normally [`crate::context::Context::resolve_tasks`]); a
    /// resolution failure here is surfaced to the caller rather than silently dropped.
    fn resolve_declared(
        &self,
        resolve: &dyn Fn(&Address) -> crate::error::Result<Vec<Arc<dyn Task>>>,
    ) -> crate::error::Result<Vec<TaskRelationship>> {
        let mut out = Vec::new();
        for rel in self.relationships.read().iter() {
            match &rel.target {
                RelationshipTarget::Task(task) => out.push(TaskRelationship {
                    other_task: task.clone(),
                    strict: rel.strict,
                    inverse: rel.inverse,
                }),
                RelationshipTarget::Address(address) => {
                    for task in resolve(address)? {
                        out.push(TaskRelationship {
                            other_task: task,
                            strict: rel.strict,
                            inverse: rel.inverse,
                        });
                    }
                }
            }
        }
        Ok(out)
    }
}

/// A unit of work, configured through [`crate::property::Property`] fields and scheduled as a
/// node in the build's task graph.
///
/// Implement this trait directly only for leaf behavior; [`TaskCore`] supplies the bookkeeping
/// every task needs (address, tags, declared relationships) so implementors only have to
/// delegate to it and provide [`Task::execute`].
pub trait Task: Send + Sync {
    fn core(&self) -> &TaskCore;

    fn address(&self) -> Address {
        self.core().address()
    }

    /// Properties belonging to this task, used to infer relationships from property lineage
    /// (see [`Task::relationships`]) and to render task descriptions. The default implementation
    /// reports none; tasks with properties should override it.
    fn properties(&self) -> Vec<Arc<dyn AnyProperty>> {
        Vec::new()
    }

    /// All relationships to other tasks: those implied by property lineage plus those declared
    /// through [`TaskCore::depends_on_task`]/[`TaskCore::depends_on_address`] and their inverses.
    /// Declared-by-address relationships are resolved via `resolve`. Takes a `dyn Fn` (rather than
    /// a generic parameter) so this stays callable through `Arc<dyn Task>`.
    fn relationships(
        &self,
        resolve: &dyn Fn(&Address) -> crate::error::Result<Vec<Arc<dyn Task>>>,
    ) -> crate::error::Result<Vec<TaskRelationship>> {
        let mut out = Vec::new();
        let self_address = self.address();
        for property in self.properties() {
            for supplier in property.derived_from() {
                if let Some(owner) = supplier.owner_task() {
                    if owner != self_address {
                        // The concrete task is recovered by the caller (e.g. the project's task
                        // registry), since `Lineage` only carries the address.
                        if let Ok(tasks) = resolve(&owner) {
                            out.extend(tasks.into_iter().map(|t| TaskRelationship {
                                other_task: t,
                                strict: true,
                                inverse: false,
                            }));
                        }
                    }
                }
            }
        }
        out.extend(self.core().resolve_declared(resolve)?);
        Ok(out)
    }

    /// Finalizes every non-output property by default, locking the task's configuration before
    /// the build executes. Called once per task from [`crate::context::Context::finalize`].
    fn finalize(&self) {
        // Tasks with properties override this to call `Property::finalize` on their inputs;
        // `TaskCore` itself has nothing to finalize.
    }

    /// Called before execution to determine whether the task can be skipped without running
    /// `execute`. The default always proceeds to execution.
    fn prepare(&self) -> crate::error::Result<TaskStatus> {
        Ok(TaskStatus::pending(None))
    }

    /// Performs the task's work. Must not return [`TaskStatusType::Pending`].
    fn execute(&self) -> crate::error::Result<TaskStatus>;

    /// Called only after a [`TaskStatusType::Started`] execution, once every direct dependant
    /// has finished (successfully or not) or no further work remains to run.
    fn teardown(&self) -> crate::error::Result<Option<TaskStatus>> {
        Ok(None)
    }

    /// Narrows to a [`GroupTask`] without needing `Any`-based downcasting: only
    /// [`GroupTask`] overrides this. Used by [`crate::graph::TaskGraph`] to unpack group
    /// membership when building the graph.
    fn as_group(&self) -> Option<&GroupTask> {
        None
    }
}

assert_obj_safe!(Task);
assert_obj_safe!(AnyProperty);

/// Groups other tasks under a single addressable name: depending on the group forces every
/// member to run. Group tasks are never individually executed -- scheduling always skips them
/// once their members are accounted for; see [`crate::graph::TaskGraph`].
pub struct GroupTask {
    core: TaskCore,
    members: RwLock<Vec<Arc<dyn Task>>>,
}

impl GroupTask {
    pub fn new(address: Address) -> Self {
        Self {
            core: TaskCore::new(address),
            members: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, task: Arc<dyn Task>) {
        let mut members = self.members.write();
        if !members.iter().any(|t| t.address() == task.address()) {
            members.push(task);
        }
    }

    pub fn members(&self) -> Vec<Arc<dyn Task>> {
        self.members.read().clone()
    }
}

impl Task for GroupTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn prepare(&self) -> crate::error::Result<TaskStatus> {
        Ok(TaskStatus::skipped(Some("is a GroupTask".to_string())))
    }

    fn execute(&self) -> crate::error::Result<TaskStatus> {
        unreachable!("GroupTask is never scheduled for execution, only its members are")
    }

    fn as_group(&self) -> Option<&GroupTask> {
        Some(self)
    }
}

/// A task that does nothing; always skippable. Useful as a placeholder dependency target.
pub struct VoidTask {
    core: TaskCore,
    pub skip: crate::property::Property<bool>,
    pub message: crate::property::Property<String>,
}

impl VoidTask {
    pub fn new(address: Address) -> Self {
        let skip = crate::property::Property::with_value(true);
        let message = crate::property::Property::with_value("is a VoidTask".to_string());
        Self {
            core: TaskCore::new(address),
            skip,
            message,
        }
    }
}

impl Task for VoidTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn prepare(&self) -> crate::error::Result<TaskStatus> {
        if self.skip.get()? {
            Ok(TaskStatus::skipped(Some(self.message.get()?)))
        } else {
            Ok(TaskStatus::pending(None))
        }
    }

    fn execute(&self) -> crate::error::Result<TaskStatus> {
        Ok(TaskStatus::succeeded(None))
    }
}

/// Spawns a process or resource that outlives a single `execute` call; [`Task::teardown`] is
/// called once every direct dependant has finished. Implement [`BackgroundTask::start`] rather
/// than [`Task::execute`] directly -- the blanket impl below wires [`TaskStatusType::Started`]
/// bookkeeping for you.
pub trait BackgroundTask: Send + Sync {
    fn core(&self) -> &TaskCore;

    /// Starts the background work. Returning anything other than `Ok(None)` or
    /// `Ok(Some(started))` is treated as a request to tear down immediately.
    fn start(&self) -> crate::error::Result<Option<TaskStatus>>;

    /// Releases whatever `start` allocated.
    fn stop(&self) -> crate::error::Result<()>;
}

impl<B: BackgroundTask> Task for B {
    fn core(&self) -> &TaskCore {
        BackgroundTask::core(self)
    }

    fn execute(&self) -> crate::error::Result<TaskStatus> {
        match self.start()? {
            None => Ok(TaskStatus::started(None)),
            Some(status) => {
                if !matches!(status.status_type, TaskStatusType::Started) {
                    self.stop()?;
                }
                Ok(status)
            }
        }
    }

    fn teardown(&self) -> crate::error::Result<Option<TaskStatus>> {
        self.stop()?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn void_task_skips_by_default() {
        let task = VoidTask::new(addr(":a:v"));
        let status = task.prepare().unwrap();
        assert_eq!(status.status_type, TaskStatusType::Skipped);
    }

    #[test]
    fn void_task_runs_when_skip_cleared() {
        let task = VoidTask::new(addr(":a:v"));
        task.skip.set(false).unwrap();
        let status = task.prepare().unwrap();
        assert_eq!(status.status_type, TaskStatusType::Pending);
    }

    #[test]
    fn group_task_collects_unique_members() {
        let group = GroupTask::new(addr(":a:g"));
        let member = Arc::new(VoidTask::new(addr(":a:v")));
        group.add(member.clone());
        group.add(member.clone());
        assert_eq!(group.members().len(), 1);
    }
}
