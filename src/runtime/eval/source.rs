//! Eval source text

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Immutable, shared source text with a precomputed content hash
///
/// Equality is by content; two handles sharing storage compare equal without
/// looking at the text.
#[derive(Clone)]
pub struct SourceText {
    text: Rc<str>,
    hash: u32,
}

impl SourceText {
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        let text = text.into();
        let hash = fnv1a_hash(text.as_bytes());
        Self { text, hash }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Content hash, stable for the lifetime of the text
    #[inline]
    pub fn hash_value(&self) -> u32 {
        self.hash
    }

    /// Whether both handles share the same storage
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Rc::ptr_eq(&self.text, &other.text)
    }
}

impl PartialEq for SourceText {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ptr_eq(other) || (self.hash == other.hash && self.text == other.text)
    }
}

impl Eq for SourceText {}

impl Hash for SourceText {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        state.write_u32(self.hash);
    }
}

impl fmt::Debug for SourceText {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "SourceText({:?})", &*self.text)
    }
}

impl fmt::Display for SourceText {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for SourceText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<Rc<str>> for SourceText {
    fn from(text: Rc<str>) -> Self {
        Self::new(text)
    }
}

impl From<&SourceText> for SourceText {
    fn from(text: &SourceText) -> Self {
        text.clone()
    }
}

/// 32-bit FNV-1a
fn fnv1a_hash(data: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
