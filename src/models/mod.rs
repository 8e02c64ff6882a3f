use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key in a link-data map that counts the distinct users contributing to an
/// edge. The Graph Builder writes exactly one unit per contributing user;
/// the Link Aggregator sums those units into the edge's support count.
pub const NUM_USERS_KEY: &str = "NUM_USERS";

/// One weighted user→item interaction, grouped by user upstream.
///
/// `signal_counts` breaks the weight down by signal type (e.g. how many
/// views vs. purchases produced it) and is only present in detailed
/// pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSignal {
    pub user: String,
    pub item: String,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_counts: Option<HashMap<String, i32>>,
}

/// One directed item→item edge emitted by the Graph Builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLink {
    pub item_a: String,
    pub item_b: String,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_data: Option<HashMap<String, i32>>,
}

/// A merged edge for one `item_a` group. The grouping key itself is dropped
/// because the caller already holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedLink {
    pub item_b: String,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_data: Option<HashMap<String, i32>>,
}

/// A candidate recommendation produced by the upstream user↔link join,
/// carrying the provenance (`reason`) of the strategy that proposed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRec {
    pub user: String,
    pub item: String,
    pub weight: f32,
    #[serde(default)]
    pub reason: Option<String>,
    pub user_link: f32,
    pub item_link: f32,
}

/// A candidate that survived refinement, with its diversity-adjusted weight
/// and 1-based position in the final list. Terminal for this pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedRec {
    #[serde(flatten)]
    pub candidate: CandidateRec,
    pub diversity_adj_weight: f32,
    pub rank: i32,
}

/// Decode a batch of engine-provided JSON rows into typed records.
///
/// Any missing field or type mismatch aborts the whole batch: the host
/// engine gets the error and no partial output.
pub fn decode_batch<T: DeserializeOwned>(rows: &[serde_json::Value]) -> Result<Vec<T>> {
    rows.iter()
        .map(|row| serde_json::from_value(row.clone()).map_err(Into::into))
        .collect()
}

/// Semantic field types for schema descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Chararray,
    Float,
    Integer,
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSchema {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// Ordered field list describing one record shape. Informational only: the
/// host engine uses it for schema declaration, nothing in the operators
/// branches on it beyond optional-field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Input schema of the basic interaction-signal record.
    pub fn interaction_signal() -> Self {
        Self::new(vec![
            FieldSchema::new("user", FieldType::Chararray),
            FieldSchema::new("item", FieldType::Chararray),
            FieldSchema::new("weight", FieldType::Float),
        ])
    }

    /// Input schema of the detailed interaction-signal record.
    pub fn interaction_signal_detailed() -> Self {
        let mut schema = Self::interaction_signal();
        schema
            .fields
            .push(FieldSchema::new("signal_counts", FieldType::Map));
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_batch_typed() {
        let rows = vec![
            json!({"user": "u1", "item": "a", "weight": 3.0}),
            json!({"user": "u1", "item": "b", "weight": 5.0, "signal_counts": {"view": 2}}),
        ];

        let signals: Vec<InteractionSignal> = decode_batch(&rows).expect("decode failed");

        assert_eq!(signals.len(), 2);
        assert!(signals[0].signal_counts.is_none());
        assert_eq!(
            signals[1].signal_counts.as_ref().unwrap().get("view"),
            Some(&2)
        );
    }

    #[test]
    fn test_decode_batch_rejects_wrong_type() {
        let rows = vec![json!({"user": "u1", "item": "a", "weight": "heavy"})];

        let result: crate::error::Result<Vec<InteractionSignal>> = decode_batch(&rows);

        assert!(matches!(
            result,
            Err(crate::error::PipelineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_decode_batch_rejects_missing_field() {
        let rows = vec![json!({"user": "u1", "weight": 1.0})];

        let result: crate::error::Result<Vec<ItemLink>> = decode_batch(&rows);

        assert!(result.is_err());
    }

    #[test]
    fn test_refined_rec_serializes_flat() {
        let rec = RefinedRec {
            candidate: CandidateRec {
                user: "u1".to_string(),
                item: "x".to_string(),
                weight: 2.5,
                reason: Some("a".to_string()),
                user_link: 1.0,
                item_link: 2.5,
            },
            diversity_adj_weight: 1.25,
            rank: 1,
        };

        let value = serde_json::to_value(&rec).expect("serialize failed");

        // Flattened: candidate fields live at the top level next to the
        // refinement fields.
        assert_eq!(value["item"], "x");
        assert_eq!(value["rank"], 1);
        assert_eq!(value["diversity_adj_weight"], 1.25);
    }

    #[test]
    fn test_schema_has_field() {
        let schema = RecordSchema::interaction_signal_detailed();

        assert!(schema.has_field("signal_counts"));
        assert!(!RecordSchema::interaction_signal().has_field("signal_counts"));
    }
}
