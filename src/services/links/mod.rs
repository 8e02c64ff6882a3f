use crate::error::{PipelineError, Result};
use crate::models::{AggregatedLink, FieldSchema, FieldType, ItemLink, RecordSchema};
use crate::services::Accumulator;
use std::collections::HashMap;
use tracing::debug;

/// Link Aggregator / Filter
///
/// For a single `item_a`, merges every edge contributed by every user into
/// one record per distinct `item_b` and drops edges whose aggregate weight
/// falls below the configured minimum.
///
/// The host engine may hand the group over as one bag (`evaluate`) or as a
/// stream of partial bags (`accumulate` repeatedly, then `finalize` and
/// `reset`); both paths run the same accumulation code and must produce the
/// same result.
///
/// Output order over `item_b` is arbitrary; downstream consumers must not
/// depend on it.
pub struct LinkAggregator {
    min_link_weight: f32,
    weights: HashMap<String, f32>,
    link_data: HashMap<String, HashMap<String, i32>>,
}

impl LinkAggregator {
    pub fn new(min_link_weight: f32) -> Self {
        Self {
            min_link_weight,
            weights: HashMap::new(),
            link_data: HashMap::new(),
        }
    }

    /// Construction from the host engine's string argument.
    pub fn from_args(min_link_weight: &str) -> Result<Self> {
        let threshold: f32 = min_link_weight.parse().map_err(|_| {
            PipelineError::Config(format!(
                "min_link_weight must be a float, got '{}'",
                min_link_weight
            ))
        })?;
        Ok(Self::new(threshold))
    }

    pub fn min_link_weight(&self) -> f32 {
        self.min_link_weight
    }

    /// Declares the output record shape: the input minus `item_a`, which the
    /// caller re-attaches from the grouping key.
    pub fn output_schema(&self, input: &RecordSchema) -> RecordSchema {
        let mut fields = vec![
            FieldSchema::new("item_b", FieldType::Chararray),
            FieldSchema::new("weight", FieldType::Float),
        ];
        if input.has_field("link_data") {
            fields.push(FieldSchema::new("link_data", FieldType::Map));
        }
        RecordSchema::new(fields)
    }
}

impl Accumulator for LinkAggregator {
    type Row = ItemLink;
    type Output = AggregatedLink;

    fn accumulate(&mut self, rows: &[ItemLink]) {
        for link in rows {
            *self.weights.entry(link.item_b.clone()).or_insert(0.0) += link.weight;

            if let Some(data) = &link.link_data {
                let merged = self.link_data.entry(link.item_b.clone()).or_default();
                for (key, count) in data {
                    *merged.entry(key.clone()).or_insert(0) += count;
                }
            }
        }
    }

    fn finalize(&self) -> Vec<AggregatedLink> {
        let kept: Vec<AggregatedLink> = self
            .weights
            .iter()
            .filter(|(_, &weight)| weight >= self.min_link_weight)
            .map(|(item_b, &weight)| AggregatedLink {
                item_b: item_b.clone(),
                weight,
                link_data: self.link_data.get(item_b).cloned(),
            })
            .collect();

        debug!(
            distinct_items = self.weights.len(),
            kept = kept.len(),
            min_link_weight = self.min_link_weight,
            "Finalized aggregated links"
        );

        kept
    }

    fn reset(&mut self) {
        self.weights.clear();
        self.link_data.clear();
    }
}
