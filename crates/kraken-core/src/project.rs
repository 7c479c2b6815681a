//! Projects: a project consolidates the tasks associated with a directory. Projects nest (a
//! subproject's address is its parent's address with one more element) and every project starts
//! out with the same default group lattice (`fmt`, `check`, `gen`, `lint`, `build`, ...).

use crate::address::Address;
use crate::task::{GroupTask, RelationshipMode, Task};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Either a task, a group task, or a nested project, keyed by name within a [`Project`].
#[derive(Clone)]
pub enum Member {
    Task(Arc<dyn Task>),
    Group(Arc<GroupTask>),
    Project(Arc<Project>),
}

impl Member {
    pub fn as_task(&self) -> Option<Arc<dyn Task>> {
        match self {
            Member::Task(t) => Some(t.clone()),
            Member::Group(g) => Some(g.clone() as Arc<dyn Task>),
            Member::Project(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<Arc<GroupTask>> {
        match self {
            Member::Group(g) => Some(g.clone()),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<Arc<Project>> {
        match self {
            Member::Project(p) => Some(p.clone()),
            _ => None,
        }
    }
}

/// A project consolidates tasks related to a directory on the filesystem.
pub struct Project {
    address: Address,
    directory: PathBuf,
    parent: Option<Weak<Project>>,
    members: RwLock<Vec<(String, Member)>>,
}

impl Project {
    /// Creates the root project, and wires up the default group lattice (see module docs).
    pub fn root(directory: PathBuf) -> Arc<Self> {
        Self::new_at(Address::root(), directory, None)
    }

    /// Creates a subproject named `name` beneath `parent`, also wiring the default group
    /// lattice, and registers it as a member of `parent`.
    pub fn child(parent: &Arc<Project>, name: impl Into<String>) -> crate::error::Result<Arc<Self>> {
        let name = name.into();
        let address = parent.address.append(crate::address::Element::new(name.clone(), false)?);
        let directory = parent.directory.join(&name);
        let child = Self::new_at(address, directory, Some(Arc::downgrade(parent)));
        parent.insert_member(name, Member::Project(child.clone()))?;
        Ok(child)
    }

    fn new_at(address: Address, directory: PathBuf, parent: Option<Weak<Project>>) -> Arc<Self> {
        let project = Arc::new(Self {
            address,
            directory,
            parent,
            members: RwLock::new(Vec::new()),
        });
        project.install_default_groups();
        project
    }

    /// Installs the fixed default group lattice every project starts with: `apply`, `fmt`,
    /// `check`, `gen`, `lint`, `build`, `audit`, `test`, `integrationTest`, `publish`, `deploy`,
    /// and `update`. `check`, `gen`, `lint` and `test` run by default; the rest are opt-in.
    fn install_default_groups(&self) {
        let apply = self.group("apply", Some("Tasks that perform automatic updates to the project consistency."), None);

        let fmt = self.group("fmt", Some("Tasks that perform code formatting operations."), None);
        fmt.core().depends_on_task(apply.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let check = self.group("check", Some("Tasks that perform project consistency checks."), Some(true));
        let gen = self.group("gen", Some("Tasks that perform code generation."), Some(true));

        let lint = self.group("lint", Some("Tasks that perform code linting."), Some(true));
        lint.core().depends_on_task(check.clone() as Arc<dyn Task>, RelationshipMode::Strict);
        lint.core().depends_on_task(gen.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let build = self.group("build", Some("Tasks that produce build artefacts."), None);
        build.core().depends_on_task(lint.clone() as Arc<dyn Task>, RelationshipMode::OrderOnly);
        build.core().depends_on_task(gen.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let audit = self.group("audit", Some("Tasks that perform auditing on built artefacts and code."), None);
        audit.core().depends_on_task(build.clone() as Arc<dyn Task>, RelationshipMode::Strict);
        audit.core().depends_on_task(gen.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let test = self.group("test", Some("Tasks that perform unit tests."), Some(true));
        test.core().depends_on_task(build.clone() as Arc<dyn Task>, RelationshipMode::OrderOnly);
        test.core().depends_on_task(gen.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let integration_test = self.group(
            "integrationTest",
            Some("Tasks that perform integration tests."),
            None,
        );
        integration_test.core().depends_on_task(test.clone() as Arc<dyn Task>, RelationshipMode::OrderOnly);
        integration_test.core().depends_on_task(gen.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let publish = self.group("publish", Some("Tasks that publish build artefacts."), None);
        publish.core().depends_on_task(integration_test.clone() as Arc<dyn Task>, RelationshipMode::OrderOnly);
        publish.core().depends_on_task(build.clone() as Arc<dyn Task>, RelationshipMode::Strict);

        let deploy = self.group("deploy", Some("Tasks that deploy applications."), None);
        deploy.core().depends_on_task(publish.clone() as Arc<dyn Task>, RelationshipMode::OrderOnly);

        self.group("update", Some("Tasks that update dependencies of the project."), None);
    }

    pub fn address(&self) -> Address {
        self.address.clone()
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    pub fn parent(&self) -> Option<Arc<Project>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The project's own name, i.e. the last element of its address. Undefined (and never
    /// called) on the root project.
    pub fn name(&self) -> crate::error::Result<String> {
        self.address.name()
    }

    fn find_member(&self, name: &str) -> Option<Member> {
        self.members.read().iter().find(|(n, _)| n == name).map(|(_, m)| m.clone())
    }

    /// Looks up an existing task by name.
    pub fn task(&self, name: &str) -> crate::error::Result<Arc<dyn Task>> {
        self.find_member(name)
            .and_then(|m| m.as_task())
            .ok_or_else(|| crate::error::KrakenError::TaskResolution(format!("no task named {name:?} in {}", self.address)))
    }

    pub fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.members.read().iter().filter_map(|(_, m)| m.as_task()).collect()
    }

    pub fn subprojects(&self) -> Vec<Arc<Project>> {
        self.members.read().iter().filter_map(|(_, m)| m.as_project()).collect()
    }

    pub fn has_subproject(&self, name: &str) -> bool {
        matches!(self.find_member(name), Some(Member::Project(_)))
    }

    pub fn subproject_named(&self, name: &str) -> Option<Arc<Project>> {
        self.find_member(name).and_then(|m| m.as_project())
    }

    /// Registers `task` as a member of this project.
    ///
    /// # Errors
    /// Returns [`crate::error::KrakenError::DuplicateMember`] if a member with the same name
    /// already exists.
    pub fn add_task(&self, task: Arc<dyn Task>) -> crate::error::Result<()> {
        let name = task.address().name()?;
        self.insert_member(name, Member::Task(task))
    }

    /// Registers `project` as a subproject of this project.
    ///
    /// # Errors
    /// Returns [`crate::error::KrakenError::DuplicateMember`] if a member with the same name
    /// already exists.
    pub fn add_child(&self, project: Arc<Project>) -> crate::error::Result<()> {
        let name = project.name()?;
        self.insert_member(name, Member::Project(project))
    }

    fn insert_member(&self, name: String, member: Member) -> crate::error::Result<()> {
        let mut members = self.members.write();
        if members.iter().any(|(n, _)| n == &name) {
            return Err(crate::error::KrakenError::DuplicateMember { name });
        }
        members.push((name, member));
        Ok(())
    }

    pub fn remove_child(&self, name: &str) {
        self.members.write().retain(|(n, m)| !(n == name && matches!(m, Member::Project(_))));
    }

    /// Creates or looks up a [`GroupTask`] named `name`. If a non-group task already owns that
    /// name, this panics -- matching the original system, where that reflects a configuration
    /// bug rather than recoverable state.
    pub fn group(&self, name: &str, description: Option<&str>, default: Option<bool>) -> Arc<GroupTask> {
        if let Some(existing) = self.find_member(name) {
            let group = existing
                .as_group()
                .unwrap_or_else(|| panic!("{}:{name} must be a GroupTask", self.address));
            if let Some(description) = description {
                group.core().set_description(description);
            }
            if let Some(default) = default {
                group.core().set_default(default);
            }
            return group;
        }

        let address = self.address.append(crate::address::Element::new(name, false).expect("valid group name"));
        let group = Arc::new(GroupTask::new(address));
        if let Some(description) = description {
            group.core().set_description(description);
        }
        group.core().set_default(default.unwrap_or(false));
        self.insert_member(name.to_string(), Member::Group(group.clone()))
            .expect("group name already validated unique above");
        group
    }

    /// The recommended build output directory for this project: the context's build directory,
    /// amended with the project's address translated to a relative path.
    pub fn build_directory(&self, context_build_directory: &std::path::Path) -> PathBuf {
        let relative = self.address.to_string().replace(':', "/");
        context_build_directory.join(relative.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_project_has_default_groups() {
        let root = Project::root(PathBuf::from("/tmp/proj"));
        for name in ["apply", "fmt", "check", "gen", "lint", "build", "audit", "test", "integrationTest", "publish", "deploy", "update"] {
            assert!(root.task(name).is_ok(), "missing default group {name}");
        }
    }

    #[test]
    fn default_enabled_groups() {
        let root = Project::root(PathBuf::from("/tmp/proj"));
        for name in ["check", "gen", "lint", "test"] {
            assert!(root.task(name).unwrap().core().is_default());
        }
        for name in ["apply", "fmt", "build", "audit", "integrationTest", "publish", "deploy", "update"] {
            assert!(!root.task(name).unwrap().core().is_default());
        }
    }

    #[test]
    fn child_project_address_nests() {
        let root = Project::root(PathBuf::from("/tmp/proj"));
        let child = Project::child(&root, "sub").unwrap();
        assert_eq!(child.address().to_string(), ":sub");
        assert!(root.has_subproject("sub"));
    }

    #[test]
    fn duplicate_member_name_rejected() {
        let root = Project::root(PathBuf::from("/tmp/proj"));
        assert!(Project::child(&root, "apply").is_err());
    }
}
