//! Anchor overlap detection
//!
//! "Same issue" has no formal definition, so overlap is a pluggable
//! [`OverlapDetector`]. [`TextOverlap`] is the default heuristic.

use std::collections::HashSet;

use crate::finding::Anchor;

/// Decides whether two anchors point at the same span of text.
pub trait OverlapDetector: Send + Sync {
    fn overlaps(&self, a: &Anchor, b: &Anchor) -> bool;
}

/// Text heuristic, checked in order:
///
/// 1. different paragraphs never overlap;
/// 2. if both anchors name a sentence, overlap iff the ids match;
/// 3. normalised quotes are equal or one contains the other;
/// 4. shared words exceed `word_overlap_ratio` of the smaller word set;
/// 5. any word n-gram with `n >= min_ngram` is shared (longest first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextOverlap {
    pub word_overlap_ratio: f64,
    pub min_ngram: usize,
}

impl Default for TextOverlap {
    fn default() -> Self {
        Self {
            word_overlap_ratio: 0.5,
            min_ngram: 2,
        }
    }
}

impl OverlapDetector for TextOverlap {
    fn overlaps(&self, a: &Anchor, b: &Anchor) -> bool {
        if a.paragraph_id != b.paragraph_id {
            return false;
        }
        if let (Some(sa), Some(sb)) = (&a.sentence_id, &b.sentence_id) {
            return sa == sb;
        }

        let ta = a.quoted_text.trim().to_lowercase();
        let tb = b.quoted_text.trim().to_lowercase();
        if ta.is_empty() || tb.is_empty() {
            return false;
        }
        if ta == tb || ta.contains(&tb) || tb.contains(&ta) {
            return true;
        }

        let wa: Vec<&str> = ta.split_whitespace().collect();
        let wb: Vec<&str> = tb.split_whitespace().collect();
        let sa: HashSet<&str> = wa.iter().copied().collect();
        let sb: HashSet<&str> = wb.iter().copied().collect();
        let smaller = sa.len().min(sb.len());
        if smaller > 0 {
            let shared = sa.intersection(&sb).count();
            if shared as f64 / smaller as f64 > self.word_overlap_ratio {
                return true;
            }
        }

        self.shares_ngram(&wa, &wb)
    }
}

impl TextOverlap {
    fn shares_ngram(&self, wa: &[&str], wb: &[&str]) -> bool {
        let longest = wa.len().min(wb.len());
        let shortest = self.min_ngram.max(1);
        (shortest..=longest).rev().any(|n| {
            let grams: HashSet<&[&str]> = wa.windows(n).collect();
            wb.windows(n).any(|w| grams.contains(w))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(paragraph: &str, sentence: Option<&str>, quote: &str) -> Anchor {
        Anchor::new(paragraph, sentence.map(str::to_string), quote).unwrap()
    }

    fn overlaps(a: &Anchor, b: &Anchor) -> bool {
        TextOverlap::default().overlaps(a, b)
    }

    #[test]
    fn test_different_paragraphs_never_overlap() {
        assert!(!overlaps(&anchor("p1", None, "same"), &anchor("p2", None, "same")));
    }

    #[test]
    fn test_sentence_ids_decide_when_both_present() {
        assert!(overlaps(
            &anchor("p1", Some("s1"), "alpha beta"),
            &anchor("p1", Some("s1"), "gamma delta")
        ));
        assert!(!overlaps(
            &anchor("p1", Some("s1"), "alpha beta"),
            &anchor("p1", Some("s2"), "alpha beta")
        ));
    }

    #[test]
    fn test_substring_is_case_insensitive() {
        assert!(overlaps(
            &anchor("p_002", None, "sample size of 10 participants"),
            &anchor("p_002", None, "  Sample size of 10 ")
        ));
    }

    #[test]
    fn test_word_overlap_above_half() {
        // 2 of 3 shared words in the smaller set.
        assert!(overlaps(
            &anchor("p1", None, "results clearly significant"),
            &anchor("p1", None, "significant results were not shown here")
        ));
    }

    #[test]
    fn test_shared_bigram() {
        // 2 of 5 shared words is below half, but "control group" is shared.
        assert!(overlaps(
            &anchor("p1", None, "the control group was small"),
            &anchor("p1", None, "no blinding of control group members")
        ));
    }

    #[test]
    fn test_disjoint_quotes() {
        assert!(!overlaps(
            &anchor("p1", None, "recruitment ran long"),
            &anchor("p1", None, "effect sizes are missing")
        ));
    }

    #[test]
    fn test_single_shared_word_is_not_enough() {
        assert!(!overlaps(
            &anchor("p1", None, "the cohort was young and healthy"),
            &anchor("p1", None, "attrition in the final wave")
        ));
    }
}
