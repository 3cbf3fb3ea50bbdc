//! Content names.
//!
//! A [`Name`] is an ordered sequence of opaque binary components. Names sort
//! in NDN canonical order: component by component, where a shorter component
//! sorts before a longer one and equal-length components compare bytewise.
//! A name that is a proper prefix of another sorts first.
//!
//! # Example
//!
//! ```
//! use ndn_sync::Name;
//!
//! let a: Name = "/repo/a".parse().unwrap();
//! let b: Name = "/repo/b".parse().unwrap();
//! assert!(a < b);
//! assert!("/repo".parse::<Name>().unwrap().is_prefix_of(&a));
//! assert_eq!(a.to_string(), "/repo/a");
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One opaque name component.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Component(Vec<u8>);

impl Component {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.0)
    }
}

/// A hierarchical content name.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The root name `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Return a new name with `component` appended.
    #[must_use]
    pub fn child(&self, component: impl Into<Component>) -> Self {
        let mut next = self.clone();
        next.push(component);
        next
    }

    pub fn push(&mut self, component: impl Into<Component>) {
        self.components.push(component.into());
    }

    /// True if every component of `self` matches the start of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }
}

impl From<Component> for Name {
    fn from(component: Component) -> Self {
        Self {
            components: vec![component],
        }
    }
}

/// Error parsing a name URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("name URI must start with '/'")]
    MissingSlash,
    #[error("bad percent escape at byte {0}")]
    BadEscape(usize),
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("ndn:")
            .unwrap_or(s)
            .strip_prefix('/')
            .ok_or(NameParseError::MissingSlash)?;
        let mut components = Vec::new();
        let mut offset = s.len() - rest.len();
        for part in rest.split('/') {
            if !part.is_empty() {
                components.push(Component(unescape(part, offset)?));
            }
            offset += part.len() + 1;
        }
        Ok(Self { components })
    }
}

fn unescape(part: &str, offset: usize) -> Result<Vec<u8>, NameParseError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or(NameParseError::BadEscape(offset + i))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for &b in bytes {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'=') {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "%{b:02X}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for c in &self.components {
            write!(f, "/")?;
            write_escaped(f, &c.0)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let name = n("/a/b%2Fc/d");
        assert_eq!(name.len(), 3);
        assert_eq!(name.components()[1].as_bytes(), b"b/c");
        assert_eq!(name.to_string(), "/a/b%2Fc/d");
        assert_eq!(n("/").to_string(), "/");
        assert_eq!(n("ndn:/x"), n("/x"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("a/b".parse::<Name>(), Err(NameParseError::MissingSlash));
        assert!(matches!(
            "/a/%zz".parse::<Name>(),
            Err(NameParseError::BadEscape(_))
        ));
    }

    #[test]
    fn test_canonical_order_shorter_component_first() {
        // "z" is shorter than "aa" so it sorts first
        assert!(n("/z") < n("/aa"));
        assert!(n("/a/1") < n("/a/3"));
        assert!(n("/a") < n("/a/0"));
    }

    #[test]
    fn test_prefix_relations() {
        let topo = n("/topo");
        let full = n("/topo/x/y");
        assert!(topo.is_prefix_of(&full));
        assert!(!full.is_prefix_of(&topo));
        assert!(!n("/top").is_prefix_of(&full));
        assert_eq!(topo.child("x").child("y"), full);
    }

    #[test]
    fn test_binary_components_escape() {
        let name = Name::root().child(&[0xC1u8, b'.', b'S'][..]);
        assert_eq!(name.to_string(), "/%C1.S");
        assert_eq!(n(&name.to_string()), name);
    }
}
