//! An address is an immutable parsed representation of a task or project reference, comparable
//! to a filesystem path. Elements are separated by a colon (`:`); `.` refers to the current
//! project and `..` to the parent. A trailing `?` on an element permits resolution failure at
//! that element, and `*` / `**` are single-level and recursive wildcards respectively.

pub mod resolver;

use crate::error::{KrakenError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SEPARATOR: char = ':';
const CURRENT_SYMBOL: &str = ".";
const PARENT_SYMBOL: &str = "..";
const RECURSIVE_WILDCARD_SYMBOL: &str = "**";

static VALIDATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9/_\-.*]+$").expect("static regex"));

/// A single component between colons in an [`Address`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Element {
    value: String,
    fallible: bool,
}

impl Element {
    pub fn new(value: impl Into<String>, fallible: bool) -> Result<Self> {
        let value = value.into();
        if !VALIDATION_REGEX.is_match(&value) {
            return Err(KrakenError::InvalidAddress(format!(
                "invalid address element: {value:?}"
            )));
        }
        Ok(Self { value, fallible })
    }

    /// Parses an element from its string form, stripping a trailing `?` into [`Element::fallible`].
    pub fn of(raw: &str) -> Result<Self> {
        match raw.strip_suffix('?') {
            Some(stripped) => Self::new(stripped, true),
            None => Self::new(raw, false),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn fallible(&self) -> bool {
        self.fallible
    }

    pub fn is_current(&self) -> bool {
        self.value == CURRENT_SYMBOL
    }

    pub fn is_parent(&self) -> bool {
        self.value == PARENT_SYMBOL
    }

    pub fn is_recursive_wildcard(&self) -> bool {
        self.value == RECURSIVE_WILDCARD_SYMBOL
    }

    /// A concrete element has exactly one match: no globbing, not fallible.
    pub fn is_concrete(&self) -> bool {
        !self.fallible && !self.value.contains('*')
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        if self.fallible {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// A parsed, immutable address (`:a:b:c`). See the module docs for the wire syntax.
#[derive(Clone, Debug, Eq)]
pub struct Address {
    is_absolute: bool,
    is_container: bool,
    elements: Vec<Element>,
}

impl Address {
    fn parse(raw: &str) -> Result<(bool, bool, Vec<Element>)> {
        let mut element_strings: Vec<&str> = if raw.is_empty() {
            vec![]
        } else if raw == ":" {
            vec![""]
        } else {
            raw.split(SEPARATOR).collect()
        };

        let mut is_absolute = false;
        if element_strings.first().is_some_and(|s| s.is_empty()) {
            is_absolute = true;
            element_strings.remove(0);
        }

        let mut is_container = false;
        if element_strings.last().is_some_and(|s| s.is_empty()) {
            is_container = true;
            element_strings.pop();
        }

        // `:` is both absolute and a container.
        if is_absolute && element_strings.is_empty() {
            is_container = true;
        }

        let mut elements = Vec::with_capacity(element_strings.len());
        for s in element_strings {
            elements.push(Element::of(s).map_err(|e| {
                KrakenError::InvalidAddress(format!("invalid address: {raw:?} (reason: {e})"))
            })?);
        }

        Ok((is_absolute, is_container, elements))
    }

    /// Constructs an address from its already-decomposed parts, promoting the pathological
    /// "semantically equivalent to root" cases (e.g. `:a:..`) to both absolute and container.
    pub fn create(is_absolute: bool, is_container: bool, elements: Vec<Element>) -> Self {
        let mut is_absolute = is_absolute;
        let mut is_container = is_container;
        if elements.is_empty() && (is_container || is_absolute) {
            is_absolute = true;
            is_container = true;
        }
        Self {
            is_absolute,
            is_container,
            elements,
        }
    }

    pub fn root() -> Self {
        Self::create(true, true, vec![])
    }

    pub fn empty() -> Self {
        Self::create(false, false, vec![])
    }

    pub fn current() -> Self {
        Self::create(false, false, vec![Element::new(CURRENT_SYMBOL, false).unwrap()])
    }

    pub fn parent_address() -> Self {
        Self::create(false, false, vec![Element::new(PARENT_SYMBOL, false).unwrap()])
    }

    pub fn wildcard() -> Self {
        Self::create(false, false, vec![Element::new("*", false).unwrap()])
    }

    pub fn recursive_wildcard() -> Self {
        Self::create(
            false,
            false,
            vec![Element::new(RECURSIVE_WILDCARD_SYMBOL, false).unwrap()],
        )
    }

    pub fn is_empty(&self) -> bool {
        !self.is_absolute && self.elements.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.is_absolute
    }

    pub fn is_root(&self) -> bool {
        self.is_absolute && self.elements.is_empty()
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    /// Absolute and every element is concrete.
    pub fn is_concrete(&self) -> bool {
        self.is_absolute && self.elements.iter().all(Element::is_concrete)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Drops `.` and resolves `..` where possible; an empty relative result becomes `.`.
    pub fn normalize(&self, keep_container: bool) -> Address {
        let mut elements: Vec<Element> = Vec::new();
        for current in &self.elements {
            if current.is_parent() && !elements.is_empty() {
                elements.pop();
            } else if current.is_current() {
                // drop
            } else {
                elements.push(current.clone());
            }
        }
        if !self.is_absolute && elements.is_empty() {
            elements.push(Element::new(CURRENT_SYMBOL, false).unwrap());
        }
        Address::create(self.is_absolute, self.is_container && keep_container, elements)
    }

    /// If `other` is absolute, returns `other`. Otherwise appends its elements, adopting its
    /// container flag.
    pub fn concat(&self, other: &Address) -> Address {
        if other.is_absolute {
            return other.clone();
        }
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().cloned());
        Address::create(self.is_absolute, other.is_container, elements)
    }

    /// Returns a non-container address with one more element appended.
    pub fn append(&self, element: Element) -> Address {
        let mut elements = self.elements.clone();
        elements.push(element);
        Address::create(self.is_absolute, false, elements)
    }

    pub fn set_container(&self, is_container: bool) -> Result<Address> {
        if self.is_root() {
            if !is_container {
                return Err(KrakenError::InvalidAddress(
                    "cannot set container status to false for root address".into(),
                ));
            }
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Err(KrakenError::InvalidAddress(
                "cannot set container status for empty address".into(),
            ));
        }
        Ok(Address::create(self.is_absolute, is_container, self.elements.clone()))
    }

    pub fn name(&self) -> Result<String> {
        self.elements.last().map(|e| e.value.clone()).ok_or_else(|| {
            KrakenError::InvalidAddress(format!("{self} has no elements, and thus no name"))
        })
    }

    pub fn parent(&self) -> Result<Address> {
        if self.is_absolute && self.elements.is_empty() {
            return Err(KrakenError::InvalidAddress("root address has no parent".into()));
        }
        if !self.is_absolute && self.elements.is_empty() {
            return Err(KrakenError::InvalidAddress("empty address has no parent".into()));
        }
        if !self.is_absolute {
            if let Some(last) = self.elements.last() {
                if last.is_current() {
                    return Ok(Address::create(
                        false,
                        self.is_container,
                        vec![Element::new(PARENT_SYMBOL, false).unwrap()],
                    ));
                }
                if last.is_parent() {
                    let mut elements = self.elements.clone();
                    elements.push(Element::new(PARENT_SYMBOL, false).unwrap());
                    return Ok(Address::create(false, self.is_container, elements));
                }
            }
            if self.elements.len() == 1 {
                return Ok(Address::current());
            }
        }
        let mut elements = self.elements.clone();
        elements.pop();
        Ok(Address::create(self.is_absolute, self.is_container, elements))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self
            .elements
            .iter()
            .map(Element::to_string)
            .collect::<Vec<_>>()
            .join(":");
        if self.is_absolute {
            value = format!(":{value}");
        }
        if self.is_container && !self.is_root() {
            value = format!("{value}:");
        }
        write!(f, "{value}")
    }
}

impl FromStr for Address {
    type Err = KrakenError;

    fn from_str(s: &str) -> Result<Self> {
        let (is_absolute, is_container, elements) = Self::parse(s)?;
        Ok(Self::create(is_absolute, is_container, elements))
    }
}

impl TryFrom<&str> for Address {
    type Error = KrakenError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl TryFrom<String> for Address {
    type Error = KrakenError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.is_absolute == other.is_absolute
            && self.is_container == other.is_container
            && self.elements == other.elements
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_absolute.hash(state);
        self.is_container.hash(state);
        self.elements.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn round_trip() {
        for s in [":a:b", "a:b", ":", "", ".", "..", ":a?:b*"] {
            assert_eq!(addr(s).to_string(), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn empty_is_neither_absolute_nor_container() {
        let a = addr("");
        assert!(a.is_empty());
        assert!(!a.is_absolute());
        assert!(!a.is_container());
    }

    #[test]
    fn root_is_absolute_and_container() {
        let a = addr(":");
        assert!(a.is_root());
        assert!(a.is_absolute());
        assert!(a.is_container());
        assert_eq!(a.len(), 0);
    }

    #[test]
    fn pathological_root_equivalent_promotes_both_flags() {
        // `:a:..` normalizes to `:` but even before normalization the parser must recognize
        // any zero-element, "absolute-or-container" form as fully root-equivalent.
        let a = Address::create(true, false, vec![]);
        assert!(a.is_absolute());
        assert!(a.is_container());
    }

    #[test]
    fn normalize_collapses_current_and_parent() {
        assert_eq!(addr("").normalize(false), addr("."));
        assert_eq!(addr(":a:.:b").normalize(false), addr(":a:b"));
        assert_eq!(addr(":a:..:b").normalize(false), addr(":b"));
        assert_eq!(addr("..:.:b").normalize(false), addr("..:b"));
        assert_eq!(addr("a:b:").normalize(false), addr("a:b"));
        assert_eq!(addr("a:b:").normalize(true), addr("a:b:"));
    }

    #[test]
    fn normalize_unmatched_parent_is_appended_not_dropped() {
        // With nothing on the stack to pop, `..` is kept verbatim.
        assert_eq!(addr("..:a").normalize(false), addr("..:a"));
    }

    #[test]
    fn concat_absolute_other_wins() {
        assert_eq!(addr(":a").concat(&addr("b:c")), addr(":a:b:c"));
        assert_eq!(addr(":a").concat(&addr(":b")), addr(":b"));
    }

    #[test]
    fn parent_cases() {
        assert_eq!(addr(":a:b").parent().unwrap(), addr(":a"));
        assert_eq!(addr(":a").parent().unwrap(), addr(":"));
        assert_eq!(addr("a").parent().unwrap(), addr("."));
        assert_eq!(addr(".").parent().unwrap(), addr(".."));
        assert_eq!(addr("..").parent().unwrap(), addr("..:.."));
        assert!(addr(":").parent().is_err());
        assert!(addr("").parent().is_err());
    }

    #[test]
    fn name_fails_on_root_and_empty() {
        assert!(addr(":").name().is_err());
        assert!(addr("").name().is_err());
        assert_eq!(addr(":a:b").name().unwrap(), "b");
    }

    #[test]
    fn is_concrete_requires_absolute_and_no_globs() {
        assert!(addr(":a:b").is_concrete());
        assert!(!addr("a:b").is_concrete());
        assert!(!addr(":*:b").is_concrete());
        assert!(!addr(":a:b?").is_concrete());
    }
}
