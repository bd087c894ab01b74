//! Assign reads to primer pairs by searching the read for any orientation of the pair's primers.
//!
//! Each [`PrimerPanelEntry`] is expanded once, when a matcher is built, into an
//! [`OrientationSet`]: the six pairings of the left and right primers and their reverse
//! complements.  A read belongs to the first entry in panel order for which either member of
//! any pairing occurs in the read, ignoring case.

use std::cell::RefCell;

use anyhow::anyhow;
use bstr::{BString, ByteSlice};
use cached::{Cached, SizedCache};
use clap::{ArgEnum, PossibleValue};
use itertools::Itertools;

use crate::{primer_panel::PrimerPanelEntry, sequence::reverse_complement};

/// The default number of distinct read sequences remembered by the [`CachedPrimerMatcher`].
pub const DEFAULT_CACHE_SIZE: usize = 100_000;

#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    Scan,
    Cached,
}

impl MatcherKind {
    pub fn possible_values<'a>() -> impl Iterator<Item = PossibleValue<'a>> {
        MatcherKind::value_variants().iter().filter_map(ArgEnum::to_possible_value)
    }
}

impl std::str::FromStr for MatcherKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for variant in Self::value_variants() {
            if variant.to_possible_value().map_or(false, |v| v.matches(s, true)) {
                return Ok(*variant);
            }
        }
        Err(anyhow!("Invalid variant: {}", s))
    }
}

/// The six pairings of a primer pair and its reverse complements:
/// `(L, R)`, `(L, rc(L))`, `(L, rc(R))`, `(R, rc(L))`, `(R, rc(R))`, `(rc(L), rc(R))`.
fn orientation_pairs(left: &[u8], right: &[u8]) -> [(BString, BString); 6] {
    let left = BString::from(left.to_ascii_uppercase());
    let right = BString::from(right.to_ascii_uppercase());
    let left_rc = reverse_complement(&left);
    let right_rc = reverse_complement(&right);
    [
        (left.clone(), right.clone()),
        (left.clone(), left_rc.clone()),
        (left, right_rc.clone()),
        (right.clone(), left_rc.clone()),
        (right, right_rc.clone()),
        (left_rc, right_rc),
    ]
}

/// The patterns derived from one primer pair, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrientationSet {
    /// The distinct members of the orientation pairs, in the order first seen.
    patterns: Vec<BString>,
}

impl OrientationSet {
    pub fn new(left: &[u8], right: &[u8]) -> Self {
        let patterns = orientation_pairs(left, right)
            .into_iter()
            .flat_map(|(a, b)| [a, b])
            .unique()
            .collect();
        Self { patterns }
    }

    /// The distinct pattern sequences.
    pub fn patterns(&self) -> &[BString] {
        &self.patterns
    }

    /// True if either member of any pair occurs in `sequence`, which must already be upper-cased.
    #[inline]
    pub fn found_in(&self, sequence: &[u8]) -> bool {
        self.patterns.iter().any(|pattern| sequence.contains_str(pattern))
    }
}

impl From<&PrimerPanelEntry> for OrientationSet {
    fn from(entry: &PrimerPanelEntry) -> Self {
        Self::new(&entry.left_primer, &entry.right_primer)
    }
}

/// The base trait for all primer matching algorithms.
pub trait Matcher {
    /// The index into [`Matcher::panel`] of the entry assigned to the read, if any.
    fn find(&self, sequence: &[u8]) -> Option<usize>;

    /// The panel being matched against.
    fn panel(&self) -> &[PrimerPanelEntry];

    /// The primer id assigned to the read, if any.
    fn find_primer_id(&self, sequence: &[u8]) -> Option<&str> {
        self.find(sequence).map(|index| self.panel()[index].primer_id.as_str())
    }
}

/// Tests every panel entry in order against each read.
#[derive(Debug)]
pub struct ScanPrimerMatcher<'a> {
    pub panel: &'a [PrimerPanelEntry],
    pub orientations: Vec<OrientationSet>,
}

impl<'a> ScanPrimerMatcher<'a> {
    pub fn new(panel: &'a [PrimerPanelEntry]) -> Self {
        let orientations = panel.iter().map(OrientationSet::from).collect();
        Self { panel, orientations }
    }

    /// Find the first entry whose patterns occur in an already upper-cased sequence.
    fn find_upper(&self, sequence: &[u8]) -> Option<usize> {
        self.orientations.iter().position(|orientation| orientation.found_in(sequence))
    }
}

impl<'a> Matcher for ScanPrimerMatcher<'a> {
    fn find(&self, sequence: &[u8]) -> Option<usize> {
        self.find_upper(&sequence.to_ascii_uppercase())
    }

    fn panel(&self) -> &[PrimerPanelEntry] {
        self.panel
    }
}

/// A [`ScanPrimerMatcher`] that remembers the result for recently seen read sequences.
#[derive(Debug)]
pub struct CachedPrimerMatcher<'a> {
    inner: ScanPrimerMatcher<'a>,
    /// Keyed by the upper-cased read sequence.
    cache: RefCell<SizedCache<Vec<u8>, Option<usize>>>,
}

impl<'a> CachedPrimerMatcher<'a> {
    pub fn new(panel: &'a [PrimerPanelEntry]) -> Self {
        Self::with_cache_size(panel, DEFAULT_CACHE_SIZE)
    }

    /// Create a matcher remembering at most `cache_size` distinct read sequences.
    pub fn with_cache_size(panel: &'a [PrimerPanelEntry], cache_size: usize) -> Self {
        Self {
            inner: ScanPrimerMatcher::new(panel),
            cache: RefCell::new(SizedCache::with_size(cache_size)),
        }
    }
}

impl<'a> Matcher for CachedPrimerMatcher<'a> {
    fn find(&self, sequence: &[u8]) -> Option<usize> {
        let sequence = sequence.to_ascii_uppercase();
        let mut cache = self.cache.borrow_mut();
        if let Some(res) = cache.cache_get(&sequence) {
            return *res;
        }
        let result = self.inner.find_upper(&sequence);
        cache.cache_set(sequence, result);
        result
    }

    fn panel(&self) -> &[PrimerPanelEntry] {
        self.inner.panel
    }
}

/// Build the matcher of the requested kind.
pub fn build_matcher<'a>(
    kind: MatcherKind,
    panel: &'a [PrimerPanelEntry],
) -> Box<dyn Matcher + 'a> {
    match kind {
        MatcherKind::Scan => Box::new(ScanPrimerMatcher::new(panel)),
        MatcherKind::Cached => Box::new(CachedPrimerMatcher::new(panel)),
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn panel(entries: &[(&str, &str, &str)]) -> Vec<PrimerPanelEntry> {
        entries.iter().map(|(id, l, r)| PrimerPanelEntry::new(id, l, r)).collect()
    }

    #[test]
    fn test_orientation_pairs() {
        let pairs = orientation_pairs(b"aacg", b"GGGT");
        let expected = [
            ("AACG", "GGGT"),
            ("AACG", "CGTT"),
            ("AACG", "ACCC"),
            ("GGGT", "CGTT"),
            ("GGGT", "ACCC"),
            ("CGTT", "ACCC"),
        ];
        for ((a, b), (ea, eb)) in pairs.iter().zip(expected.iter()) {
            assert_eq!(a, ea);
            assert_eq!(b, eb);
        }
        let set = OrientationSet::new(b"aacg", b"GGGT");
        assert_eq!(set.patterns(), &["AACG", "GGGT", "CGTT", "ACCC"]);
    }

    #[test]
    fn test_palindromic_primers_dedup_patterns() {
        let set = OrientationSet::new(b"ACGT", b"ACGT");
        assert_eq!(set.patterns(), &["ACGT"]);
    }

    #[rstest]
    #[rustfmt::skip]
    #[case("GGGGAAAATTTTGGGG", Some("P1"))] // both primers, direct orientation
    #[case("GGGGAAAACCCCGGGG", Some("P1"))] // left only
    #[case("CCCCTTTTCCCC",     Some("P1"))] // reverse complements only
    #[case("GGGGACGTTGCAGGGG", Some("P2"))] // left of P2 only
    #[case("CCCCTGCAACGTCCCC", Some("P2"))] // rc(left) of P2
    #[case("ggggttggccaagggg", Some("P2"))] // lower case read, right of P2
    #[case("GGGGCCCCGGGGCCCC", None)]
    #[case("",                 None)]
    fn test_find_primer_id(
        #[values(MatcherKind::Scan, MatcherKind::Cached)] kind: MatcherKind,
        #[case] read: &str,
        #[case] expected: Option<&str>,
    ) {
        let panel = panel(&[("P1", "AAAA", "GGAA"), ("P2", "ACGTTGCA", "TTGGCCAA")]);
        let matcher = build_matcher(kind, &panel);
        assert_eq!(matcher.find_primer_id(read.as_bytes()), expected);
    }

    #[rstest]
    fn test_matching_is_case_insensitive(
        #[values(MatcherKind::Scan, MatcherKind::Cached)] kind: MatcherKind,
    ) {
        let upper = panel(&[("P1", "ACGTACGT", "GGGGGGGG")]);
        let lower = panel(&[("P1", "acgtacgt", "gggggggg")]);
        for read in ["TTACGTACGTTT", "ttacgtacgttt", "TtAcGtAcGtTt"] {
            assert_eq!(build_matcher(kind, &upper).find(read.as_bytes()), Some(0));
            assert_eq!(build_matcher(kind, &lower).find(read.as_bytes()), Some(0));
        }
    }

    #[rstest]
    fn test_first_match_by_panel_order(
        #[values(MatcherKind::Scan, MatcherKind::Cached)] kind: MatcherKind,
    ) {
        let read = b"AAAAAAAACCCCCCCC";
        let first_a = panel(&[("A", "AAAA", "GTGT"), ("C", "CCCC", "GTGT")]);
        let first_c = panel(&[("C", "CCCC", "GTGT"), ("A", "AAAA", "GTGT")]);
        assert_eq!(build_matcher(kind, &first_a).find_primer_id(read), Some("A"));
        assert_eq!(build_matcher(kind, &first_c).find_primer_id(read), Some("C"));
    }

    #[test]
    fn test_duplicate_ids_first_entry_wins() {
        let panel = panel(&[("P1", "AAAA", "TTTT"), ("P1", "CCCC", "GGGG")]);
        let matcher = ScanPrimerMatcher::new(&panel);
        assert_eq!(matcher.find(b"AAAATTTT"), Some(0));
        // The second entry is still reachable for reads the first cannot match.
        assert_eq!(matcher.find(b"CCCCGGGG"), Some(1));
        assert_eq!(matcher.find_primer_id(b"CCCCGGGG"), Some("P1"));
    }

    #[test]
    fn test_cached_matchers_for_different_panels_are_independent() {
        let read = b"ACACACACAAAA";
        let first = panel(&[("P1", "AAAA", "CGCG")]);
        let second = panel(&[("P2", "GGGGGG", "CCGGTT")]);
        let first_matcher = CachedPrimerMatcher::new(&first);
        let second_matcher = CachedPrimerMatcher::new(&second);

        for _ in 0..2 {
            assert_eq!(first_matcher.find(read), Some(0));
            assert_eq!(second_matcher.find(read), None);
            assert_eq!(second_matcher.find(read), ScanPrimerMatcher::new(&second).find(read));
        }
    }

    #[test]
    fn test_cached_matcher_with_small_cache_agrees_with_scan() {
        let panel = panel(&[("P1", "AAAA", "GGAA"), ("P2", "ACGTTGCA", "TTGGCCAA")]);
        let scan = ScanPrimerMatcher::new(&panel);
        let cached = CachedPrimerMatcher::with_cache_size(&panel, 2);
        let reads: [&[u8]; 5] =
            [b"GGGGAAAATTTT", b"CCCCTGCAACGT", b"GCGCGCGC", b"ggggaaaatttt", b"GGGGAAAATTTT"];
        for _ in 0..3 {
            for read in reads {
                assert_eq!(cached.find(read), scan.find(read));
            }
        }
    }

    #[rstest]
    #[case("scan", MatcherKind::Scan)]
    #[case("cached", MatcherKind::Cached)]
    #[case("CACHED", MatcherKind::Cached)]
    fn test_matcher_kind_from_str(#[case] value: &str, #[case] expected: MatcherKind) {
        assert_eq!(value.parse::<MatcherKind>().unwrap(), expected);
    }

    #[test]
    fn test_matcher_kind_from_str_invalid() {
        assert!("aho-corasick".parse::<MatcherKind>().is_err());
    }
}
