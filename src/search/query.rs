use crate::core::error::{Error, Result};
use crate::indexing::segmenter::Granularity;
use crate::search::rerank::Reranker;
use crate::storage::index::{GranularIndex, Segment};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

/// A single query, with per-request overrides of the configured defaults
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    pub mode: Option<Granularity>,
    pub recency_weight: Option<f32>,
    pub n_results: Option<usize>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One ranked answer
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub text: String,
    pub date: Option<NaiveDate>,
    pub granularity: Granularity,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_section: Option<String>,
    pub score: f32,
}

/// A dense-retrieval hit with its metadata snapshot, taken atomically with
/// the search while the index lock is held.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub segment: Segment,
    pub similarity: f32,
}

/// Reject empty or whitespace-only query text before any model work.
pub fn validate_query_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("Query text cannot be empty.".to_string()));
    }
    Ok(trimmed)
}

/// Dense retrieval: top candidates by similarity, each paired with a clone
/// of its metadata. Identifiers without resolvable metadata are skipped.
/// The caller must hold the index lock for the duration of this call.
pub fn collect_candidates(
    index: &GranularIndex,
    query_vector: &[f32],
    n_candidates: usize,
) -> Vec<Candidate> {
    index
        .search(query_vector, n_candidates)
        .into_iter()
        .filter_map(|(id, similarity)| {
            index.segment(id).map(|segment| Candidate {
                segment: segment.clone(),
                similarity,
            })
        })
        .collect()
}

/// Rerank candidates, apply recency decay, and shape the final results.
///
/// The rerank score supersedes similarity as the primary signal. When
/// `recency_weight` is positive and a candidate has a date, the score drops
/// by `weight × age_in_whole_days`. The sort is stable and descending, so
/// ties keep rerank order, which itself keeps similarity order.
pub fn rank(
    query: &str,
    candidates: Vec<Candidate>,
    reranker: &dyn Reranker,
    recency_weight: f32,
    today: NaiveDate,
    n_results: usize,
) -> Result<Vec<QueryResult>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = candidates.iter().map(|c| c.segment.text.clone()).collect();
    let scores = reranker.score(query, &texts)?;
    if scores.len() != candidates.len() {
        return Err(Error::Model(format!(
            "Reranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut scored: Vec<(Candidate, f32)> = candidates
        .into_iter()
        .zip(scores)
        .map(|(candidate, relevance)| {
            let mut score = relevance;
            if recency_weight > 0.0 {
                if let Some(date) = candidate.segment.date {
                    let age_days = (today - date).num_days();
                    score -= recency_weight * age_days as f32;
                }
            }
            (candidate, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(n_results)
        .map(|(candidate, score)| QueryResult {
            text: candidate.segment.text,
            date: candidate.segment.date,
            granularity: candidate.segment.granularity,
            title: candidate.segment.title,
            parent_memory: candidate.segment.parent_memory,
            parent_section: candidate.segment.parent_section,
            score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores each candidate by the number of query words it contains.
    struct WordOverlapReranker;

    impl Reranker for WordOverlapReranker {
        fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
            let words: Vec<&str> = query.split_whitespace().collect();
            Ok(candidates
                .iter()
                .map(|c| words.iter().filter(|w| c.contains(*w)).count() as f32)
                .collect())
        }
    }

    fn candidate(text: &str, date: Option<NaiveDate>, similarity: f32) -> Candidate {
        Candidate {
            segment: Segment {
                text: text.to_string(),
                title: None,
                granularity: Granularity::Memory,
                source_file: "test.md".to_string(),
                date,
                parent_memory: None,
                parent_section: None,
            },
            similarity,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        assert!(matches!(
            validate_query_text(""),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_query_text("   \t\n"),
            Err(Error::Validation(_))
        ));
        assert_eq!(validate_query_text("  milk  ").unwrap(), "milk");
    }

    #[test]
    fn test_rank_orders_by_rerank_score() {
        let today = day(2025, 8, 6);
        let candidates = vec![
            candidate("nothing relevant", None, 0.9),
            candidate("bought milk today", None, 0.5),
        ];

        let results = rank(
            "milk",
            candidates,
            &WordOverlapReranker,
            0.0,
            today,
            10,
        )
        .unwrap();

        // Rerank supersedes similarity
        assert_eq!(results[0].text, "bought milk today");
    }

    #[test]
    fn test_recency_breaks_rerank_ties() {
        let today = day(2025, 8, 31);
        let recent = day(2025, 8, 30); // 1 day old
        let old = day(2025, 8, 1); // 30 days old

        // Listed old-first so ordering must come from the decay, not input order
        let candidates = vec![
            candidate("milk note from earlier", Some(old), 0.9),
            candidate("milk note from yesterday", Some(recent), 0.8),
        ];

        let results = rank(
            "milk",
            candidates,
            &WordOverlapReranker,
            0.1,
            today,
            10,
        )
        .unwrap();

        assert_eq!(results[0].text, "milk note from yesterday");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_zero_recency_weight_ignores_dates() {
        let today = day(2025, 8, 31);
        let candidates = vec![
            candidate("milk a", Some(day(2020, 1, 1)), 0.9),
            candidate("milk b", Some(day(2025, 8, 30)), 0.8),
        ];

        let results = rank(
            "milk",
            candidates,
            &WordOverlapReranker,
            0.0,
            today,
            10,
        )
        .unwrap();

        // Equal rerank scores and no decay: stable sort keeps similarity order
        assert_eq!(results[0].text, "milk a");
    }

    #[test]
    fn test_undated_candidates_skip_decay() {
        let today = day(2025, 8, 31);
        let candidates = vec![
            candidate("milk dated", Some(day(2025, 7, 1)), 0.9),
            candidate("milk undated", None, 0.8),
        ];

        let results = rank(
            "milk",
            candidates,
            &WordOverlapReranker,
            0.5,
            today,
            10,
        )
        .unwrap();

        assert_eq!(results[0].text, "milk undated");
    }

    #[test]
    fn test_rank_truncates_to_n_results() {
        let today = day(2025, 8, 6);
        let candidates = (0..10)
            .map(|i| candidate(&format!("milk {}", i), None, 1.0 - i as f32 * 0.01))
            .collect();

        let results = rank("milk", candidates, &WordOverlapReranker, 0.0, today, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_rank_empty_candidates_is_empty() {
        let today = day(2025, 8, 6);
        let results = rank("milk", Vec::new(), &WordOverlapReranker, 0.0, today, 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_collect_candidates_skips_missing_metadata() {
        let mut index = GranularIndex::new(2);
        index.add(
            vec![1.0, 0.0],
            Segment {
                text: "resolvable".to_string(),
                title: None,
                granularity: Granularity::Line,
                source_file: "a.md".to_string(),
                date: None,
                parent_memory: None,
                parent_section: None,
            },
        );

        let candidates = collect_candidates(&index, &[1.0, 0.0], 5);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segment.text, "resolvable");

        // A loaded snapshot has vectors but no metadata; nothing surfaces
        let empty_meta = {
            use tempfile::TempDir;
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("snap.bin");
            index.save(&path).unwrap();
            GranularIndex::load(&path).unwrap()
        };
        assert!(collect_candidates(&empty_meta, &[1.0, 0.0], 5).is_empty());
    }
}
