// SPDX-License-Identifier: GPL-3.0-or-later

//! Fuzzy artist-name matching used to link ticketing attractions to catalog
//! artists.
//!
//! Names are normalized (accents folded, punctuation stripped, whitespace
//! collapsed) before scoring:
//! - identical names score 1.0
//! - one name containing the other scores 0.9
//! - otherwise `1 - levenshtein / max_len`, plus up to 0.2 when the names
//!   only differ by abbreviations such as "&" for "and"
//!
//! Thresholds apply to the name score alone. Upstream popularity only breaks
//! ties between candidates.

use std::cmp::Ordering;

use encore_domain::normalize_name;
use encore_upstream::CatalogArtist;

pub const DEFAULT_ACCEPT_CONFIDENCE: f64 = 0.85;
pub const DEFAULT_REJECT_CONFIDENCE: f64 = 0.7;

const SUBSTRING_SCORE: f64 = 0.9;
const MAX_ABBREVIATION_BOOST: f64 = 0.2;
const MAX_POPULARITY_BOOST: f64 = 0.5;

/// How a candidate's confidence was classified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchDecision {
    Accepted { confidence: f64 },
    /// Accepted, but persisted with `needs_review` set.
    NeedsReview { confidence: f64 },
    Rejected { confidence: f64 },
}

impl MatchDecision {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Accepted { confidence }
            | Self::NeedsReview { confidence }
            | Self::Rejected { confidence } => *confidence,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    pub fn needs_review(&self) -> bool {
        matches!(self, Self::NeedsReview { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub artist: CatalogArtist,
    /// Name similarity in `[0, 1]`.
    pub score: f64,
    /// Score after the popularity tie-breaker, used for ranking only.
    pub rank: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtistMatcher {
    accept: f64,
    reject: f64,
}

impl Default for ArtistMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPT_CONFIDENCE, DEFAULT_REJECT_CONFIDENCE)
    }
}

impl ArtistMatcher {
    pub fn new(accept: f64, reject: f64) -> Self {
        Self { accept, reject }
    }

    pub fn classify(&self, confidence: f64) -> MatchDecision {
        if confidence >= self.accept {
            MatchDecision::Accepted { confidence }
        } else if confidence >= self.reject {
            MatchDecision::NeedsReview { confidence }
        } else {
            MatchDecision::Rejected { confidence }
        }
    }

    /// Best candidate for `name` and its classification, or `None` when there
    /// are no candidates.
    ///
    /// Candidates are classified on their raw name score first. Popularity
    /// only orders candidates inside the same band, so a popular weak match
    /// never displaces a confident one. When every candidate is rejected the
    /// closest name is returned.
    pub fn best_match(
        &self,
        name: &str,
        candidates: &[CatalogArtist],
    ) -> Option<(ScoredCandidate, MatchDecision)> {
        candidates
            .iter()
            .map(|artist| {
                let score = name_similarity(name, &artist.name);
                let candidate = ScoredCandidate {
                    rank: popularity_boost(score, artist.popularity),
                    score,
                    artist: artist.clone(),
                };
                (candidate, self.classify(score))
            })
            .max_by(|(a, a_decision), (b, b_decision)| {
                let by_rank = if a_decision.is_accepted() {
                    a.rank.total_cmp(&b.rank)
                } else {
                    Ordering::Equal
                };
                band(a_decision)
                    .cmp(&band(b_decision))
                    .then(by_rank)
                    .then_with(|| a.score.total_cmp(&b.score))
            })
    }
}

/// Similarity of two names in `[0, 1]`.
pub fn name_similarity(left: &str, right: &str) -> f64 {
    let left_norm = normalize_name(left);
    let right_norm = normalize_name(right);
    if left_norm.is_empty() || right_norm.is_empty() {
        return 0.0;
    }

    let base = normalized_score(&left_norm, &right_norm);
    if base >= 1.0 {
        return 1.0;
    }

    let expanded = normalized_score(&expand_abbreviations(left), &expand_abbreviations(right));
    let boost = (expanded - base).clamp(0.0, MAX_ABBREVIATION_BOOST);
    (base + boost).min(1.0)
}

fn normalized_score(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }
    if left.contains(right) || right.contains(left) {
        return SUBSTRING_SCORE;
    }

    let max_len = left.chars().count().max(right.chars().count());
    let distance = levenshtein_distance(left, right);
    1.0 - distance as f64 / max_len as f64
}

/// Normalized form with common abbreviations spelled out and a leading
/// article dropped.
fn expand_abbreviations(value: &str) -> String {
    let spaced = value.replace('&', " and ").replace('+', " and ");
    let normalized = normalize_name(&spaced);
    let mut tokens: Vec<&str> = normalized
        .split_whitespace()
        .map(|token| match token {
            "n" => "and",
            "ft" | "feat" => "featuring",
            "st" => "saint",
            "vs" => "versus",
            other => other,
        })
        .collect();
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }
    tokens.join(" ")
}

fn band(decision: &MatchDecision) -> u8 {
    match decision {
        MatchDecision::Accepted { .. } => 2,
        MatchDecision::NeedsReview { .. } => 1,
        MatchDecision::Rejected { .. } => 0,
    }
}

/// Raise `score` by up to half of itself for popular artists, capped at 1.0.
fn popularity_boost(score: f64, popularity: Option<i64>) -> f64 {
    let popularity = popularity.unwrap_or(0).clamp(0, 100) as f64 / 100.0;
    (score * (1.0 + MAX_POPULARITY_BOOST * popularity)).min(1.0)
}

fn levenshtein_distance(left: &str, right: &str) -> usize {
    let left_chars: Vec<char> = left.chars().collect();
    let right_chars: Vec<char> = right.chars().collect();

    if left_chars.is_empty() {
        return right_chars.len();
    }
    if right_chars.is_empty() {
        return left_chars.len();
    }

    let mut previous_row: Vec<usize> = (0..=right_chars.len()).collect();
    let mut current_row: Vec<usize> = vec![0; right_chars.len() + 1];

    for (left_index, left_char) in left_chars.iter().enumerate() {
        current_row[0] = left_index + 1;
        for (right_index, right_char) in right_chars.iter().enumerate() {
            let insert_cost = current_row[right_index] + 1;
            let delete_cost = previous_row[right_index + 1] + 1;
            let replace_cost = previous_row[right_index] + usize::from(left_char != right_char);
            current_row[right_index + 1] = insert_cost.min(delete_cost).min(replace_cost);
        }
        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row[right_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, name: &str, popularity: i64) -> CatalogArtist {
        CatalogArtist {
            id: id.to_string(),
            name: name.to_string(),
            images: Vec::new(),
            popularity: Some(popularity),
            genres: Vec::new(),
        }
    }

    #[test]
    fn accents_and_punctuation_do_not_matter() {
        assert!(name_similarity("Beyonce", "Beyoncé") >= 0.85);
        assert_eq!(name_similarity("AC/DC", "acdc"), 1.0);
        assert_eq!(name_similarity("  The   Weeknd ", "the weeknd"), 1.0);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(name_similarity("AC/DC", "Taylor Swift") < 0.5);
        assert_eq!(name_similarity("", "Taylor Swift"), 0.0);
        assert_eq!(name_similarity("!!!", "Taylor Swift"), 0.0);
    }

    #[test]
    fn containment_scores_point_nine() {
        assert_eq!(name_similarity("Queen", "Queens of the Stone Age"), 0.9);
        assert_eq!(name_similarity("Florence and the Machine", "Florence"), 0.9);
        // a dropped leading article counts as an equivalence
        assert!((name_similarity("Weeknd", "The Weeknd") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn abbreviation_equivalence_is_boosted() {
        let plain = normalized_score(
            &normalize_name("Simon & Garfunkel"),
            &normalize_name("Simon and Garfunkel"),
        );
        let boosted = name_similarity("Simon & Garfunkel", "Simon and Garfunkel");

        assert!(boosted > plain);
        assert!(boosted - plain <= MAX_ABBREVIATION_BOOST + 1e-9);
        assert!(boosted >= 0.85);
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn thresholds_split_into_three_bands() {
        let matcher = ArtistMatcher::default();
        assert!(matches!(matcher.classify(0.85), MatchDecision::Accepted { .. }));
        assert!(matches!(matcher.classify(0.7), MatchDecision::NeedsReview { .. }));
        assert!(matches!(matcher.classify(0.69), MatchDecision::Rejected { .. }));
        assert!(matcher.classify(0.75).needs_review());
        assert!(!matcher.classify(0.2).is_accepted());
    }

    #[test]
    fn popularity_breaks_ties_without_lifting_confidence() {
        let matcher = ArtistMatcher::default();
        let candidates = vec![
            candidate("tribute", "Nirvana", 5),
            candidate("real", "Nirvana", 80),
        ];

        let (best, decision) = matcher.best_match("Nirvana", &candidates).unwrap();
        assert_eq!(best.artist.id, "real");
        assert_eq!(decision, MatchDecision::Accepted { confidence: 1.0 });
    }

    #[test]
    fn popular_weak_match_is_still_rejected() {
        let matcher = ArtistMatcher::default();
        let candidates = vec![candidate("ts", "Taylor Swift", 100)];

        let (best, decision) = matcher.best_match("Tyler Childers", &candidates).unwrap();
        assert!(best.rank >= best.score);
        assert!(!decision.is_accepted());
    }

    #[test]
    fn no_candidates_means_no_match() {
        assert!(ArtistMatcher::default().best_match("Ed Sheeran", &[]).is_none());
    }

    #[test]
    fn popular_rejected_candidate_never_outranks_confident_one() {
        let matcher = ArtistMatcher::default();
        let candidates = vec![
            candidate("am", "Arctic Monkeys", 10),
            candidate("decoy", "Antic Mankee", 100),
        ];

        let (best, decision) = matcher.best_match("Arctic Monkey", &candidates).unwrap();

        assert_eq!(best.artist.id, "am");
        assert_eq!(decision, MatchDecision::Accepted { confidence: 0.9 });
    }

    #[test]
    fn popularity_does_not_cross_confidence_bands() {
        let matcher = ArtistMatcher::default();
        let candidates = vec![
            candidate("review", "Arctic Monks", 100),
            candidate("confident", "Arctic Monkeys", 0),
        ];

        let (best, decision) = matcher.best_match("Arctic Monkey", &candidates).unwrap();

        assert_eq!(best.artist.id, "confident");
        assert!(!decision.needs_review());
    }

    #[test]
    fn all_rejected_returns_closest_name() {
        let matcher = ArtistMatcher::default();
        let candidates = vec![
            candidate("far", "Tyler Farr", 100),
            candidate("near", "Tyler Chase", 1),
        ];

        let (best, decision) = matcher.best_match("Tyler Childers", &candidates).unwrap();

        assert_eq!(best.artist.id, "near");
        assert!(!decision.is_accepted());
    }
}
