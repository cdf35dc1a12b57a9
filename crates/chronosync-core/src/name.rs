//! Hierarchical names.
//!
//! A [`Name`] is an ordered list of opaque byte [`Component`]s. Requests and
//! responses are matched purely by name: a request matches every response
//! whose name starts with the request name.
//!
//! Components use the canonical ordering: a shorter component is less, and
//! components of equal length compare byte by byte.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{CoreError, Result};

/// Marker byte for sequence-number components.
const SEQUENCE_MARKER: u8 = 0xFE;

/// A single name component.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Component(Bytes);

impl Component {
    /// Create a component from raw bytes.
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self(value.into())
    }

    /// The empty component.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode a sequence number: marker `0xFE` then the big-endian value
    /// without leading zero bytes.
    pub fn from_sequence_number(seq: u64) -> Self {
        let be = seq.to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count().min(7);
        let mut buf = Vec::with_capacity(1 + be.len() - skip);
        buf.push(SEQUENCE_MARKER);
        buf.extend_from_slice(&be[skip..]);
        Self(Bytes::from(buf))
    }

    /// Interpret this component as a sequence number.
    pub fn to_sequence_number(&self) -> Result<u64> {
        match self.0.split_first() {
            Some((&SEQUENCE_MARKER, rest)) if !rest.is_empty() && rest.len() <= 8 => {
                Ok(rest.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
            }
            _ => Err(CoreError::NotSequenceNumber),
        }
    }

    /// URI-escaped form of this component.
    ///
    /// Unreserved characters pass through, everything else becomes `%XX`.
    /// A component made only of periods gets three extra periods so that
    /// `.` and `..` survive URI normalization.
    pub fn to_escaped_string(&self) -> String {
        if self.0.iter().all(|&b| b == b'.') {
            return ".".repeat(self.0.len() + 3);
        }

        let mut out = String::with_capacity(self.0.len());
        for &b in self.0.iter() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                out.push(b as char);
            } else {
                out.push_str(&format!("%{:02X}", b));
            }
        }
        out
    }

    /// Parse a URI-escaped component.
    pub fn from_escaped(s: &str) -> Result<Self> {
        if s.bytes().all(|b| b == b'.') {
            if s.len() < 3 {
                return Err(CoreError::InvalidComponent(format!(
                    "{:?} is not a valid component",
                    s
                )));
            }
            return Ok(Self(Bytes::from(vec![b'.'; s.len() - 3])));
        }

        let raw = s.as_bytes();
        let mut buf = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'%' {
                let hex = s
                    .get(i + 1..i + 3)
                    .ok_or_else(|| CoreError::InvalidComponent(format!("truncated escape in {:?}", s)))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| CoreError::InvalidComponent(format!("bad escape %{} in {:?}", hex, s)))?;
                buf.push(byte);
                i += 3;
            } else {
                buf.push(raw[i]);
                i += 1;
            }
        }
        Ok(Self(Bytes::from(buf)))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_ref().cmp(other.0.as_ref()))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.to_escaped_string())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_escaped_string())
    }
}

impl AsRef<[u8]> for Component {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Component {
    fn from(b: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Component {
    fn from(b: Vec<u8>) -> Self {
        Self(Bytes::from(b))
    }
}

/// An ordered sequence of components.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The empty name `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a name from components.
    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    /// Append a component, builder style.
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Append a component in place.
    pub fn push(&mut self, component: impl Into<Component>) {
        self.components.push(component.into());
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component at `index`.
    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    /// The first `n` components (all of them if `n` exceeds the length).
    pub fn prefix(&self, n: usize) -> Name {
        Name::from_components(self.components[..n.min(self.len())].to_vec())
    }

    /// True if every component of `self` equals the corresponding leading
    /// component of `other`. The empty name is a prefix of every name.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// URI form, e.g. `/ndn/chat/%00%01`.
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for component in &self.components {
            out.push('/');
            out.push_str(&component.to_escaped_string());
        }
        out
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.len().cmp(&other.len())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Name {
    type Err = CoreError;

    /// Parse a URI. An optional `ndn:` scheme is accepted and empty path
    /// segments are skipped.
    fn from_str(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        if !path.is_empty() && !path.starts_with('/') {
            return Err(CoreError::InvalidName(format!("{:?} is not absolute", uri)));
        }

        let components = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(Component::from_escaped)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components })
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl<'a> IntoIterator for &'a Name {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}
