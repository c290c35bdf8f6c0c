//! Eval cache key
//!
//! A key is the pair (source content, call site). The same text evaluated
//! from two different call sites yields two distinct entries.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::source::SourceText;

/// Identifies one static eval invocation point in compiled code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CallSiteIndex(u32);

impl CallSiteIndex {
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallSiteIndex {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Composite key of the eval code cache
#[derive(Debug, Clone)]
pub struct CacheKey {
    source: SourceText,
    call_site: CallSiteIndex,
}

impl CacheKey {
    pub fn new(
        source: impl Into<SourceText>,
        call_site: CallSiteIndex,
    ) -> Self {
        Self {
            source: source.into(),
            call_site,
        }
    }

    #[inline]
    pub fn source(&self) -> &SourceText {
        &self.source
    }

    #[inline]
    pub fn call_site(&self) -> CallSiteIndex {
        self.call_site
    }

    /// Content hash mixed with the call-site bits
    #[inline]
    pub fn hash_value(&self) -> u32 {
        self.source.hash_value() ^ self.call_site.bits()
    }
}

impl PartialEq for CacheKey {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.call_site == other.call_site && self.source == other.source
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        state.write_u32(self.hash_value());
    }
}

impl fmt::Display for CacheKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        const PREVIEW: usize = 32;
        let text = self.source.as_str();
        match text.char_indices().nth(PREVIEW) {
            Some((cut, _)) => write!(f, "{:?}...@{}", &text[..cut], self.call_site),
            None => write!(f, "{:?}@{}", text, self.call_site),
        }
    }
}
