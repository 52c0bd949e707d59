//! Function filtering for tracked calls
//!
//! Two independent filters are consulted on every call:
//! - the call filter decides whether a call is tracked at all, either by
//!   ignoring listed names or by tracking only listed names
//! - the argument filter decides whether a call's argument summary is
//!   appended to its symbol
//!
//! Both gate an exact name scan behind a 256-bit bitmap indexed by the
//! symbol's 8-bit hash. For most calls the bit is clear and the answer is
//! known without comparing any strings.

use crate::config::FilterMode;
use crate::symbol::{symbol_hash, ROOT_SYMBOL};

const BLOOM_BYTES: usize = 256 / 8;

/// One bit per possible symbol hash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BloomBitmap {
    bits: [u8; BLOOM_BYTES],
}

impl BloomBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: u8) {
        self.bits[usize::from(hash >> 3)] |= 1 << (hash & 0x7);
    }

    #[inline]
    pub fn may_contain(&self, hash: u8) -> bool {
        self.bits[usize::from(hash >> 3)] & (1 << (hash & 0x7)) != 0
    }

    pub fn clear(&mut self) {
        self.bits = [0; BLOOM_BYTES];
    }
}

/// Owned name list behind a bloom pre-check
#[derive(Debug, Clone, Default)]
pub struct NameSet {
    names: Vec<String>,
    bloom: BloomBitmap,
}

impl NameSet {
    /// Build from a name list. O(n).
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = NameSet::default();
        for name in names {
            let name = name.as_ref();
            set.bloom.insert(symbol_hash(name));
            set.names.push(name.to_string());
        }
        set
    }

    /// Exact membership, skipping the scan when the hash bit is clear
    #[inline]
    pub fn contains(&self, hash: u8, symbol: &str) -> bool {
        self.bloom.may_contain(hash) && self.names.iter().any(|name| name == symbol)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Decides which calls are tracked
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    rule: Option<(FilterMode, NameSet)>,
}

impl CallFilter {
    /// A filter that tracks every call
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(mode: FilterMode, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CallFilter {
            rule: Some((mode, NameSet::new(names))),
        }
    }

    /// Track everything except `names`
    pub fn ignoring<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(FilterMode::Ignore, names)
    }

    /// Track only `names` and the root symbol
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(FilterMode::Only, names)
    }

    pub fn mode(&self) -> Option<FilterMode> {
        self.rule.as_ref().map(|(mode, _)| *mode)
    }

    /// Whether a call with this symbol participates in tracking
    #[inline]
    pub fn tracks(&self, hash: u8, symbol: &str) -> bool {
        match &self.rule {
            None => true,
            Some((FilterMode::Ignore, names)) => !names.contains(hash, symbol),
            Some((FilterMode::Only, names)) => {
                symbol == ROOT_SYMBOL || names.contains(hash, symbol)
            }
        }
    }

    /// Convenience wrapper computing the hash
    pub fn should_track(&self, symbol: &str) -> bool {
        self.tracks(symbol_hash(symbol), symbol)
    }
}

/// Decides which calls have their arguments captured
#[derive(Debug, Clone, Default)]
pub struct ArgumentFilter {
    names: Option<NameSet>,
}

impl ArgumentFilter {
    /// Capture arguments for no call
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ArgumentFilter {
            names: Some(NameSet::new(names)),
        }
    }

    #[inline]
    pub fn captures(&self, hash: u8, symbol: &str) -> bool {
        self.names
            .as_ref()
            .is_some_and(|names| names.contains(hash, symbol))
    }

    pub fn should_capture(&self, symbol: &str) -> bool {
        self.captures(symbol_hash(symbol), symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_insert_and_check() {
        let mut bloom = BloomBitmap::new();
        assert!(!bloom.may_contain(0));
        assert!(!bloom.may_contain(255));
        bloom.insert(0);
        bloom.insert(255);
        bloom.insert(9);
        assert!(bloom.may_contain(0));
        assert!(bloom.may_contain(255));
        assert!(bloom.may_contain(9));
        assert!(!bloom.may_contain(8));
        assert!(!bloom.may_contain(10));
        bloom.clear();
        assert!(!bloom.may_contain(9));
    }

    #[test]
    fn test_name_set_exact_match() {
        let set = NameSet::new(["foo", "bar"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(symbol_hash("foo"), "foo"));
        assert!(!set.contains(symbol_hash("fo"), "fo"));
    }

    #[test]
    fn test_name_set_collision_falls_back_to_compare() {
        let set = NameSet::new(["foo"]);
        // Same hash bit, different name: the scan must reject it
        assert!(!set.contains(symbol_hash("foo"), "not-foo"));
    }

    #[test]
    fn test_all_tracks_everything() {
        let filter = CallFilter::all();
        assert!(filter.should_track("anything"));
        assert!(filter.should_track(ROOT_SYMBOL));
        assert!(filter.mode().is_none());
    }

    #[test]
    fn test_ignore_list() {
        let filter = CallFilter::ignoring(["B"]);
        assert!(filter.should_track("A"));
        assert!(!filter.should_track("B"));
        assert!(filter.should_track("C"));
        assert_eq!(filter.mode(), Some(FilterMode::Ignore));
    }

    #[test]
    fn test_only_list_keeps_root() {
        let filter = CallFilter::only(["A"]);
        assert!(filter.should_track("A"));
        assert!(!filter.should_track("B"));
        assert!(filter.should_track(ROOT_SYMBOL));
    }

    #[test]
    fn test_empty_only_list_tracks_root_alone() {
        let filter = CallFilter::only(Vec::<String>::new());
        assert!(filter.should_track(ROOT_SYMBOL));
        assert!(!filter.should_track("A"));
    }

    #[test]
    fn test_argument_filter() {
        let filter = ArgumentFilter::new(["fopen", "PDO::query"]);
        assert!(filter.should_capture("fopen"));
        assert!(filter.should_capture("PDO::query"));
        assert!(!filter.should_capture("fclose"));
        assert!(!ArgumentFilter::none().should_capture("fopen"));
    }
}
