//! Story progression gating and campaign content scoring.
//!
//! Content from acts the party has not reached is hidden, with a one-act
//! lookahead for spoiler-free material. Surviving hits are re-ranked so
//! material from the current act and arc rises to the top.

use crate::config::RetrievalConfig;
use crate::store::{ChunkMetadata, QueryHit};
use std::cmp::Ordering;

/// The act a piece of content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActNumber {
    Known(u32),
    /// Act metadata exists but could not be read.
    Unknown,
}

impl ActNumber {
    /// Parse `"2"`, `"II"` or `"Act II"`. Roman numerals cover I to IV.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        let value = lower.strip_prefix("act").map(str::trim).unwrap_or(lower.as_str());

        if let Ok(n) = value.parse::<u32>() {
            return ActNumber::Known(n);
        }
        match value {
            "i" => ActNumber::Known(1),
            "ii" => ActNumber::Known(2),
            "iii" => ActNumber::Known(3),
            "iv" => ActNumber::Known(4),
            _ => ActNumber::Unknown,
        }
    }

    /// The act of a stored chunk, or `None` when it carries no act metadata.
    ///
    /// `act_number` wins; otherwise the number is read from the `act` label.
    pub fn of(metadata: &ChunkMetadata) -> Option<Self> {
        metadata
            .act_number
            .as_deref()
            .or(metadata.act.as_deref())
            .map(Self::parse)
    }

    pub fn known(self) -> Option<u32> {
        match self {
            ActNumber::Known(n) => Some(n),
            ActNumber::Unknown => None,
        }
    }
}

/// Whether a chunk may be shown to a party in `current_act`.
pub fn is_visible(metadata: &ChunkMetadata, current_act: u32) -> bool {
    if metadata.is_dm_guide() {
        return true;
    }
    let content_act = match ActNumber::of(metadata) {
        // No act metadata: general reference
        None => return true,
        Some(ActNumber::Unknown) => return true,
        Some(ActNumber::Known(n)) => n,
    };

    if content_act <= current_act {
        true
    } else if content_act == current_act + 1 {
        !metadata.contains_spoilers() && !metadata.is_future_possibility()
    } else {
        false
    }
}

/// Drop hits the party should not see yet. Order is preserved.
pub fn filter_by_progression(hits: Vec<QueryHit>, current_act: u32) -> Vec<QueryHit> {
    hits.into_iter()
        .filter(|hit| is_visible(&hit.metadata, current_act))
        .collect()
}

/// Rescale a hit's distance by story relevance. Lower is better.
pub fn score_content_priority(
    hit: &QueryHit,
    current_act: &str,
    current_arc: &str,
    weights: &RetrievalConfig,
) -> f32 {
    let metadata = &hit.metadata;
    let mut score = hit.distance;

    if is_current_act(metadata, current_act) {
        score *= weights.current_act_factor;

        let arc = current_arc.trim().to_lowercase();
        let in_arc = !arc.is_empty()
            && metadata
                .source
                .as_deref()
                .is_some_and(|source| source.to_lowercase().contains(&arc));
        if in_arc {
            score *= weights.current_arc_factor;
        }
    }

    if metadata.is_player_content() {
        score *= weights.player_content_factor;
    }

    if metadata.contains_spoilers() || metadata.is_future_possibility() {
        score *= weights.spoiler_penalty;
    }

    score
}

fn is_current_act(metadata: &ChunkMetadata, current_act: &str) -> bool {
    let Some(act) = metadata.act.as_deref() else {
        return false;
    };
    match (ActNumber::parse(act), ActNumber::parse(current_act)) {
        (ActNumber::Known(a), ActNumber::Known(b)) => a == b,
        _ => act.trim().eq_ignore_ascii_case(current_act.trim()),
    }
}

/// Score, sort ascending and keep the best `limit` hits.
pub fn rank_content(
    mut hits: Vec<QueryHit>,
    current_act: &str,
    current_arc: &str,
    weights: &RetrievalConfig,
    limit: usize,
) -> Vec<QueryHit> {
    for hit in &mut hits {
        hit.distance = score_content_priority(hit, current_act, current_arc, weights);
    }
    hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(metadata: ChunkMetadata) -> QueryHit {
        QueryHit {
            id: "chunk".to_string(),
            document: "text".to_string(),
            metadata,
            distance: 0.5,
        }
    }

    fn act(n: &str) -> ChunkMetadata {
        ChunkMetadata {
            act_number: Some(n.to_string()),
            story_relevance: Some("current_content".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_act_numbers() {
        assert_eq!(ActNumber::parse("3"), ActNumber::Known(3));
        assert_eq!(ActNumber::parse("III"), ActNumber::Known(3));
        assert_eq!(ActNumber::parse("Act IV"), ActNumber::Known(4));
        assert_eq!(ActNumber::parse(" act 2 "), ActNumber::Known(2));
        assert_eq!(ActNumber::parse("Prologue"), ActNumber::Unknown);
        assert_eq!(ActNumber::parse("Unknown").known(), None);
    }

    #[test]
    fn test_act_from_label_when_number_missing() {
        let meta = ChunkMetadata {
            act: Some("Act II".to_string()),
            ..Default::default()
        };
        assert_eq!(ActNumber::of(&meta), Some(ActNumber::Known(2)));
        assert_eq!(ActNumber::of(&ChunkMetadata::default()), None);
    }

    #[test]
    fn test_dm_guide_always_visible() {
        let meta = ChunkMetadata {
            is_dm_guide: Some(true),
            contains_spoilers: Some(true),
            ..act("IV")
        };
        assert!(is_visible(&meta, 1));
    }

    #[test]
    fn test_two_acts_ahead_rejected() {
        assert!(!is_visible(&act("III"), 1));
        assert!(!is_visible(&act("4"), 1));
    }

    #[test]
    fn test_next_act_lookahead() {
        assert!(is_visible(&act("II"), 1));

        let spoiler = ChunkMetadata {
            contains_spoilers: Some(true),
            ..act("II")
        };
        assert!(!is_visible(&spoiler, 1));

        let future = ChunkMetadata {
            story_relevance: Some("future_possibilities".to_string()),
            ..act("II")
        };
        assert!(!is_visible(&future, 1));
    }

    #[test]
    fn test_past_and_unparseable_kept() {
        assert!(is_visible(&act("I"), 2));
        assert!(is_visible(&act("0"), 1));
        assert!(is_visible(&act("Epilogue"), 1));
        assert!(is_visible(&ChunkMetadata::default(), 1));
    }

    #[test]
    fn test_filter_preserves_order() {
        let hits = vec![hit(act("I")), hit(act("III")), hit(act("II"))];
        let kept = filter_by_progression(hits, 1);
        let acts: Vec<_> = kept
            .iter()
            .map(|h| h.metadata.act_number.clone().unwrap())
            .collect();
        assert_eq!(acts, vec!["I", "II"]);
    }

    #[test]
    fn test_current_act_arc_player_content() {
        let weights = RetrievalConfig::default();
        let meta = ChunkMetadata {
            act: Some("Act I".to_string()),
            source: Some("campaign/act_1/arc_a/Arc A - Death House.md".to_string()),
            is_player_content: Some(true),
            ..Default::default()
        };
        let mut h = hit(meta);
        h.distance = 1.0;
        let score = score_content_priority(&h, "Act I", "Arc A", &weights);
        assert!((score - 0.24).abs() < 1e-6);
    }

    #[test]
    fn test_boost_and_penalty_direction() {
        let weights = RetrievalConfig::default();
        let current = hit(ChunkMetadata {
            act: Some("Act I".to_string()),
            ..Default::default()
        });
        assert!(score_content_priority(&current, "Act I", "Arc A", &weights) < current.distance);

        let spoiler = hit(ChunkMetadata {
            contains_spoilers: Some(true),
            ..Default::default()
        });
        assert!(score_content_priority(&spoiler, "Act I", "Arc A", &weights) > spoiler.distance);

        let future = hit(ChunkMetadata {
            contains_spoilers: Some(true),
            story_relevance: Some("future_possibilities".to_string()),
            ..Default::default()
        });
        let penalized = score_content_priority(&future, "Act I", "Arc A", &weights);
        assert!((penalized - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_arc_needs_current_act() {
        let weights = RetrievalConfig::default();
        let h = hit(ChunkMetadata {
            act: Some("Act II".to_string()),
            source: Some("Arc A notes.md".to_string()),
            ..Default::default()
        });
        assert_eq!(score_content_priority(&h, "Act I", "Arc A", &weights), h.distance);
    }

    #[test]
    fn test_rank_content_sorts_and_truncates() {
        let weights = RetrievalConfig::default();
        let mut a = hit(ChunkMetadata::default());
        a.id = "plain".to_string();
        let mut b = hit(ChunkMetadata {
            act: Some("Act I".to_string()),
            ..Default::default()
        });
        b.id = "current".to_string();
        let ranked = rank_content(vec![a, b], "Act I", "Arc A", &weights, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "current");
    }
}
