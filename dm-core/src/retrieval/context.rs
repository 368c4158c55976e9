//! Retrieved context items and their prompt rendering.

use crate::store::ChunkMetadata;
use std::cmp::Ordering;
use std::fmt;

/// Which tier produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    CurrentSession,
    SessionHistory,
    CampaignContent,
}

impl ContextSource {
    /// Priority is fixed by tier.
    pub fn priority(self) -> Priority {
        match self {
            ContextSource::CurrentSession => Priority::Highest,
            ContextSource::SessionHistory => Priority::High,
            ContextSource::CampaignContent => Priority::Normal,
        }
    }
}

/// Merge order: `Highest` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Highest,
    High,
    Normal,
}

/// One unit of retrieved text considered for the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextItem {
    text: String,
    source: ContextSource,
    metadata: ChunkMetadata,
    distance: f32,
}

impl ContextItem {
    pub fn new(
        text: impl Into<String>,
        source: ContextSource,
        metadata: ChunkMetadata,
        distance: f32,
    ) -> Self {
        Self {
            text: text.into(),
            source,
            metadata,
            distance,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> ContextSource {
        self.source
    }

    pub fn priority(&self) -> Priority {
        self.source.priority()
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    /// Relevance; lower is more relevant.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Multiply the distance by `factor`. The only way distance changes.
    pub fn rescale(&mut self, factor: f32) {
        self.distance *= factor;
    }

    /// Provenance tag shown before the text.
    pub fn label(&self) -> String {
        match self.source {
            ContextSource::CurrentSession => "[Current Session]".to_string(),
            ContextSource::SessionHistory => {
                let session = self
                    .metadata
                    .session_number
                    .map_or_else(|| "?".to_string(), |n| n.to_string());
                let section = self
                    .metadata
                    .section_type
                    .as_deref()
                    .map_or_else(|| "General".to_string(), title_case);
                format!("[Session {session} - {section}]")
            }
            ContextSource::CampaignContent => {
                let content_type = self.metadata.content_type.as_deref().unwrap_or("Unknown");
                format!("[Campaign Content - {content_type}]")
            }
        }
    }
}

impl fmt::Display for ContextItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label(), self.text)
    }
}

/// `"key_events"` becomes `"Key Events"`.
fn title_case(snake: &str) -> String {
    snake
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable sort by priority, then distance.
pub fn merge_items(mut items: Vec<ContextItem>) -> Vec<ContextItem> {
    items.sort_by(|a, b| {
        a.priority().cmp(&b.priority()).then_with(|| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
        })
    });
    items
}

/// Render items for the prompt, separated by blank lines.
pub fn format_context(items: &[ContextItem]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: ContextSource, distance: f32) -> ContextItem {
        ContextItem::new(format!("{source:?}"), source, ChunkMetadata::default(), distance)
    }

    #[test]
    fn test_priority_dominates_distance() {
        let merged = merge_items(vec![
            item(ContextSource::CampaignContent, 0.01),
            item(ContextSource::SessionHistory, 0.2),
            item(ContextSource::CurrentSession, 0.9),
            item(ContextSource::SessionHistory, 0.1),
        ]);
        let order: Vec<_> = merged.iter().map(|i| (i.source(), i.distance())).collect();
        assert_eq!(
            order,
            vec![
                (ContextSource::CurrentSession, 0.9),
                (ContextSource::SessionHistory, 0.1),
                (ContextSource::SessionHistory, 0.2),
                (ContextSource::CampaignContent, 0.01),
            ]
        );
    }

    #[test]
    fn test_merge_is_stable_on_ties() {
        let mut first = item(ContextSource::CampaignContent, 0.3);
        first.text = "first".to_string();
        let mut second = item(ContextSource::CampaignContent, 0.3);
        second.text = "second".to_string();
        let merged = merge_items(vec![first, second]);
        assert_eq!(merged[0].text(), "first");
    }

    #[test]
    fn test_labels() {
        let history = ContextItem::new(
            "The party fled the windmill.",
            ContextSource::SessionHistory,
            ChunkMetadata {
                session_number: Some(3),
                section_type: Some("key_events".to_string()),
                ..Default::default()
            },
            0.4,
        );
        assert_eq!(history.to_string(), "[Session 3 - Key Events] The party fled the windmill.");

        let campaign = ContextItem::new(
            "Vallaki is a walled town.",
            ContextSource::CampaignContent,
            ChunkMetadata {
                content_type: Some("location".to_string()),
                ..Default::default()
            },
            0.4,
        );
        assert_eq!(campaign.label(), "[Campaign Content - location]");

        let live = item(ContextSource::CurrentSession, 0.1);
        assert_eq!(live.label(), "[Current Session]");
    }

    #[test]
    fn test_rescale_is_multiplicative() {
        let mut i = item(ContextSource::SessionHistory, 0.8);
        i.rescale(0.5);
        i.rescale(0.5);
        assert!((i.distance() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_context(&[]), "");
        let items = vec![
            item(ContextSource::CurrentSession, 0.1),
            item(ContextSource::CampaignContent, 0.2),
        ];
        assert_eq!(
            format_context(&items),
            "[Current Session] CurrentSession\n\n[Campaign Content - Unknown] CampaignContent"
        );
    }
}
