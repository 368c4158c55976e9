use super::ChunkMetadata;
use serde_json::Value;

/// A predicate over chunk metadata fields.
///
/// A missing field never equals anything: it fails `Eq` and `In` and
/// passes `Ne`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(filters: impl IntoIterator<Item = MetadataFilter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = MetadataFilter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self {
            Self::Eq(field, value) => metadata.field(field).as_ref() == Some(value),
            Self::Ne(field, value) => metadata.field(field).as_ref() != Some(value),
            Self::In(field, values) => metadata
                .field(field)
                .is_some_and(|actual| values.contains(&actual)),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}
