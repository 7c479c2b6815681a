//! Resolves a query [`Address`] against an [`AddressSpace`], producing a tree of resolution
//! steps and, ultimately, the set of matching entities.

use super::{Address, Element};
use crate::error::{KrakenError, Result};
use std::fmt;

/// Anything that can report its own address within a space.
pub trait Addressable {
    fn address(&self) -> Address;
}

/// Navigation capability over some space of addressable entities. Projects and tasks are
/// unified under a single entity type `T` by the caller (see `kraken-core::context`).
pub trait AddressSpace<T: Addressable + Clone> {
    fn root(&self) -> T;
    fn parent(&self, entity: &T) -> Option<T>;
    fn children(&self, entity: &T) -> Vec<T>;
}

/// A step in the address resolution: the entity/query pair from which resolution continues.
#[derive(Debug)]
pub struct ResolutionStep<T> {
    pub entity: T,
    pub query: Address,
    pub matches: Vec<T>,
    pub next_steps: Vec<ResolutionStep<T>>,
    previous_was_recursive_wildcard: bool,
}

impl<T> ResolutionStep<T> {
    /// A leaf step is the root address, or a relative query with exactly one element left.
    pub fn is_leaf(&self) -> bool {
        self.query.is_root() || (!self.query.is_absolute() && self.query.len() == 1)
    }

    /// A concrete step must resolve to exactly one entity; used to decide whether an empty
    /// result is an error or an accepted zero-match outcome.
    pub fn is_concrete(&self) -> bool {
        if self.previous_was_recursive_wildcard {
            return false;
        }
        self.query.is_absolute() || self.query.get(0).is_some_and(Element::is_concrete)
    }
}

/// The full tree produced by [`resolve_address`].
#[derive(Debug)]
pub struct ResolutionResult<T> {
    pub root: ResolutionStep<T>,
}

impl<T: Clone> ResolutionResult<T> {
    pub fn all_steps(&self) -> Vec<&ResolutionStep<T>> {
        fn collect<'a, T>(step: &'a ResolutionStep<T>, out: &mut Vec<&'a ResolutionStep<T>>) {
            out.push(step);
            for next in &step.next_steps {
                collect(next, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    pub fn matches(&self) -> Vec<T> {
        self.all_steps()
            .into_iter()
            .flat_map(|step| step.matches.iter().cloned())
            .collect()
    }
}

/// Raised when a concrete resolution step has no matching successors.
#[derive(Debug, Clone)]
pub struct AddressResolutionError {
    pub entity: Address,
    pub query: Address,
    pub failed_at: Address,
    pub remainder: Address,
}

impl AddressResolutionError {
    /// True if the failure is that of the element immediately following a recursive wildcard
    /// (recursive wildcards themselves never fail to resolve).
    pub fn is_recursive_wildcard_failure(&self) -> bool {
        self.remainder.len() > 0 && self.remainder.get(0).is_some_and(Element::is_recursive_wildcard)
    }

    /// The absolute address that does not exist, for diagnostics.
    pub fn get_nonexistent_address(&self) -> Address {
        let shift = usize::from(self.is_recursive_wildcard_failure());
        let take = shift + usize::from(!self.remainder.is_absolute());
        let clipped_elements: Vec<Element> =
            self.remainder.elements().iter().take(take).cloned().collect();
        let clipped = Address::create(
            self.remainder.is_absolute(),
            self.remainder.is_container(),
            clipped_elements,
        );
        self.failed_at.concat(&clipped)
    }
}

impl fmt::Display for AddressResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not resolve address '{}' in context '{}'. the failure occurred at address '{}' \
             trying to resolve the remainder '{}'. the address '{}' does not exist.",
            self.query,
            self.entity,
            self.failed_at,
            self.remainder,
            self.get_nonexistent_address()
        )
    }
}

impl std::error::Error for AddressResolutionError {}

fn recurse_tree<T, S>(space: &S, entity: &T, include_root: bool, out: &mut Vec<T>)
where
    T: Addressable + Clone,
    S: AddressSpace<T>,
{
    if include_root {
        out.push(entity.clone());
    }
    for child in space.children(entity) {
        recurse_tree(space, &child, true, out);
    }
}

fn has_children<T, S>(space: &S, entity: &T) -> bool
where
    T: Addressable + Clone,
    S: AddressSpace<T>,
{
    !space.children(entity).is_empty()
}

fn glob_match(pattern: &str, name: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(name))
        .unwrap_or(false)
}

/// Resolves `query` in `space`, starting from `entity`, following the elements of the query one
/// at a time. See the crate-level docs for the wire syntax.
pub fn resolve_address<T, S>(space: &S, entity: T, query: &Address) -> Result<ResolutionResult<T>>
where
    T: Addressable + Clone,
    S: AddressSpace<T>,
{
    if query.is_empty() {
        return Err(KrakenError::InvalidAddress(
            "an empty address query cannot be resolved".into(),
        ));
    }
    let root_entity_address = entity.address();
    let root_query = query.clone();
    let restrict_to_containers = query.is_container();
    let root = resolve_step(
        space,
        false,
        entity,
        query.clone(),
        restrict_to_containers,
        &root_entity_address,
        &root_query,
    )?;
    Ok(ResolutionResult { root })
}

#[allow(clippy::too_many_arguments)]
fn resolve_step<T, S>(
    space: &S,
    previous_was_recursive_wildcard: bool,
    entity: T,
    query: Address,
    restrict_to_containers: bool,
    root_entity_address: &Address,
    root_query: &Address,
) -> Result<ResolutionStep<T>>
where
    T: Addressable + Clone,
    S: AddressSpace<T>,
{
    debug_assert!(!query.is_empty());

    let mut current_step = ResolutionStep {
        entity: entity.clone(),
        query: query.clone(),
        matches: vec![],
        next_steps: vec![],
        previous_was_recursive_wildcard,
    };

    let (element, next_entities, remainder): (Option<Element>, Vec<T>, Option<Address>) =
        if query.is_absolute() {
            let next_entities = vec![space.root()];
            let remainder = if query.elements().is_empty() {
                None
            } else {
                Some(Address::create(false, query.is_container(), query.elements().to_vec()))
            };
            (None, next_entities, remainder)
        } else {
            let element = query.elements()[0].clone();
            let remainder = if query.len() > 1 {
                Some(Address::create(
                    query.is_absolute(),
                    query.is_container(),
                    query.elements()[1..].to_vec(),
                ))
            } else {
                Some(Address::empty())
            };
            let next_entities = if element.is_current() {
                vec![entity.clone()]
            } else if element.is_parent() {
                space.parent(&entity).into_iter().collect()
            } else if element.is_recursive_wildcard() {
                let include_root = remainder.as_ref().is_some_and(|r| !r.is_empty());
                let mut out = vec![];
                recurse_tree(space, &entity, include_root, &mut out);
                out
            } else {
                space
                    .children(&entity)
                    .into_iter()
                    .filter(|c| {
                        c.address()
                            .name()
                            .map(|name| glob_match(element.value(), &name))
                            .unwrap_or(false)
                    })
                    .collect()
            };
            (Some(element), next_entities, remainder)
        };

    if current_step.is_concrete() && next_entities.is_empty() {
        return Err(KrakenError::from(AddressResolutionError {
            entity: root_entity_address.clone(),
            query: root_query.clone(),
            failed_at: entity.address(),
            remainder: query.clone(),
        }));
    }

    match &remainder {
        None => {
            if restrict_to_containers {
                current_step
                    .matches
                    .extend(next_entities.into_iter().filter(|e| has_children(space, e)));
            } else {
                current_step.matches.extend(next_entities);
            }
        }
        Some(r) if r.is_empty() => {
            if restrict_to_containers {
                current_step
                    .matches
                    .extend(next_entities.into_iter().filter(|e| has_children(space, e)));
            } else {
                current_step.matches.extend(next_entities);
            }
        }
        Some(remainder) => {
            let is_recursive_wildcard = element.as_ref().is_some_and(Element::is_recursive_wildcard);
            for next_entity in &next_entities {
                let next_step = resolve_step(
                    space,
                    is_recursive_wildcard,
                    next_entity.clone(),
                    remainder.clone(),
                    restrict_to_containers,
                    root_entity_address,
                    root_query,
                )?;
                current_step.next_steps.push(next_step);
            }

            let last_fallible = remainder.elements().last().is_some_and(Element::fallible);
            if !last_fallible && is_recursive_wildcard {
                let any_result = current_step
                    .next_steps
                    .iter()
                    .any(|s| !s.next_steps.is_empty() || !s.matches.is_empty());
                if !any_result {
                    return Err(KrakenError::from(AddressResolutionError {
                        entity: root_entity_address.clone(),
                        query: root_query.clone(),
                        failed_at: entity.address(),
                        remainder: query.clone(),
                    }));
                }
            }
        }
    }

    Ok(current_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Clone, Debug)]
    struct Node(Rc<NodeInner>);

    #[derive(Debug)]
    struct NodeInner {
        address: Address,
    }

    impl Addressable for Node {
        fn address(&self) -> Address {
            self.0.address.clone()
        }
    }

    struct Tree {
        root: Node,
        children: HashMap<String, Vec<Node>>,
        parents: HashMap<String, Node>,
    }

    impl Tree {
        fn node(addr: &str) -> Node {
            Node(Rc::new(NodeInner {
                address: addr.parse().unwrap(),
            }))
        }

        /// Builds a:a, a:a:... etc. matching the `:a`, `:a:a`, `:c`, `:c:a` layout used throughout
        /// the spec's recursive-wildcard scenario.
        fn sample() -> Self {
            let root = Self::node(":");
            let a = Self::node(":a");
            let aa = Self::node(":a:a");
            let c = Self::node(":c");
            let ca = Self::node(":c:a");
            let mut children = HashMap::new();
            children.insert(":".to_string(), vec![a.clone(), c.clone()]);
            children.insert(":a".to_string(), vec![aa.clone()]);
            children.insert(":c".to_string(), vec![ca.clone()]);
            let mut parents = HashMap::new();
            parents.insert(":a".to_string(), root.clone());
            parents.insert(":a:a".to_string(), a.clone());
            parents.insert(":c".to_string(), root.clone());
            parents.insert(":c:a".to_string(), c.clone());
            Self {
                root,
                children,
                parents,
            }
        }
    }

    impl AddressSpace<Node> for Tree {
        fn root(&self) -> Node {
            self.root.clone()
        }
        fn parent(&self, entity: &Node) -> Option<Node> {
            self.parents.get(&entity.address().to_string()).cloned()
        }
        fn children(&self, entity: &Node) -> Vec<Node> {
            self.children
                .get(&entity.address().to_string())
                .cloned()
                .unwrap_or_default()
        }
    }

    fn addresses(nodes: Vec<Node>) -> Vec<String> {
        let mut v: Vec<String> = nodes.into_iter().map(|n| n.address().to_string()).collect();
        v.sort();
        v
    }

    #[test]
    fn recursive_wildcard_matches_all_descendants() {
        let tree = Tree::sample();
        let result = resolve_address(&tree, tree.root(), &":*:a".parse().unwrap()).unwrap();
        assert_eq!(addresses(result.matches()), vec![":a:a", ":c:a"]);
    }

    #[test]
    fn unmatched_concrete_element_fails() {
        let tree = Tree::sample();
        let err = resolve_address(&tree, tree.root(), &":d".parse().unwrap()).unwrap_err();
        assert!(matches!(err, KrakenError::AddressResolution(_)));
    }

    #[test]
    fn fallible_element_suppresses_failure() {
        let tree = Tree::sample();
        let result = resolve_address(&tree, tree.root(), &":d?".parse().unwrap()).unwrap();
        assert!(result.matches().is_empty());
    }

    #[test]
    fn recursive_wildcard_requires_at_least_one_match_unless_fallible() {
        let tree = Tree::sample();
        assert!(resolve_address(&tree, tree.root(), &"**:d".parse().unwrap()).is_err());
        let result = resolve_address(&tree, tree.root(), &"**:d?".parse().unwrap()).unwrap();
        assert!(result.matches().is_empty());
    }

    #[test]
    fn recursive_wildcard_excludes_self_when_remainder_present() {
        let tree = Tree::sample();
        let result = resolve_address(&tree, tree.root(), &"**:c".parse().unwrap()).unwrap();
        assert_eq!(addresses(result.matches()), vec![":c"]);
    }
}
