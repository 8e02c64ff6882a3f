use crate::models::{
    FieldSchema, FieldType, InteractionSignal, ItemLink, RecordSchema, NUM_USERS_KEY,
};
use crate::services::ProgressReporter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Graph Builder
///
/// For a single user, turns that user's bag of weighted item interactions
/// into the item-item edge set the user contributes to the global graph.
///
/// Algorithm:
/// 1. Self-join the user's item set: every unordered pair of rows, O(n²)
/// 2. Edge weight = min of the two item weights
/// 3. Emit the edge in both directions so downstream grouping by `item_a`
///    sees every pair from both sides
///
/// When the input carries per-signal counts, the two items' maps are merged
/// key-wise and the `NUM_USERS` key is overwritten to 1: one unit of support
/// per contributing user, regardless of how many signal types the user had.
///
/// The all-pairs join is inherent to building a full item-item graph from
/// one user's signals; capping the item set per user is a product decision
/// made upstream, not here.
#[derive(Default)]
pub struct GraphBuilder {
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self { reporter: None }
    }

    /// Attach the host engine's liveness hook. It is ticked once per input
    /// row so long item sets keep the surrounding job alive.
    pub fn with_reporter(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter: Some(reporter),
        }
    }

    /// Build the edge set for one user's batch of signals.
    ///
    /// The batch is assumed to share a single user (the grouping key); rows
    /// are not deduplicated by item.
    pub fn build(&self, signals: &[InteractionSignal]) -> Vec<ItemLink> {
        let n = signals.len();
        let mut links = Vec::with_capacity(n.saturating_sub(1) * n);

        for (i, u) in signals.iter().enumerate() {
            for v in signals.iter().skip(i + 1) {
                let weight = u.weight.min(v.weight);
                let link_data =
                    merge_signal_counts(u.signal_counts.as_ref(), v.signal_counts.as_ref());

                links.push(ItemLink {
                    item_a: u.item.clone(),
                    item_b: v.item.clone(),
                    weight,
                    link_data: link_data.clone(),
                });
                links.push(ItemLink {
                    item_a: v.item.clone(),
                    item_b: u.item.clone(),
                    weight,
                    link_data,
                });
            }

            if let Some(reporter) = &self.reporter {
                reporter.progress();
            }
        }

        debug!(
            signal_count = n,
            link_count = links.len(),
            "Built item-item links for user batch"
        );

        links
    }

    /// Declares the output record shape for the host engine. `link_data` is
    /// present exactly when the input carries `signal_counts`.
    pub fn output_schema(&self, input: &RecordSchema) -> RecordSchema {
        let mut fields = vec![
            FieldSchema::new("item_a", FieldType::Chararray),
            FieldSchema::new("item_b", FieldType::Chararray),
            FieldSchema::new("weight", FieldType::Float),
        ];
        if input.has_field("signal_counts") {
            fields.push(FieldSchema::new("link_data", FieldType::Map));
        }
        RecordSchema::new(fields)
    }
}

/// Merge two items' signal-count maps into one edge's link data: values are
/// summed key-wise, then `NUM_USERS` is forced to 1 to record exactly one
/// contributing user for this edge. `None` on both sides means the batch is
/// running in basic mode and no map is emitted.
fn merge_signal_counts(
    u_counts: Option<&HashMap<String, i32>>,
    v_counts: Option<&HashMap<String, i32>>,
) -> Option<HashMap<String, i32>> {
    if u_counts.is_none() && v_counts.is_none() {
        return None;
    }

    let mut merged = v_counts.cloned().unwrap_or_default();
    if let Some(counts) = u_counts {
        for (key, count) in counts {
            *merged.entry(key.clone()).or_insert(0) += count;
        }
    }
    merged.insert(NUM_USERS_KEY.to_string(), 1);

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockProgressReporter;

    fn signal(item: &str, weight: f32) -> InteractionSignal {
        InteractionSignal {
            user: "u1".to_string(),
            item: item.to_string(),
            weight,
            signal_counts: None,
        }
    }

    fn detailed_signal(item: &str, weight: f32, counts: &[(&str, i32)]) -> InteractionSignal {
        InteractionSignal {
            signal_counts: Some(
                counts
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect(),
            ),
            ..signal(item, weight)
        }
    }

    fn find<'a>(links: &'a [ItemLink], a: &str, b: &str) -> &'a ItemLink {
        links
            .iter()
            .find(|l| l.item_a == a && l.item_b == b)
            .unwrap_or_else(|| panic!("missing link {} -> {}", a, b))
    }

    #[test]
    fn test_all_pairs_min_weight() {
        let signals = vec![signal("a", 3.0), signal("b", 5.0), signal("c", 1.0)];

        let links = GraphBuilder::new().build(&signals);

        assert_eq!(links.len(), 6);
        assert_eq!(find(&links, "a", "b").weight, 3.0);
        assert_eq!(find(&links, "b", "a").weight, 3.0);
        assert_eq!(find(&links, "a", "c").weight, 1.0);
        assert_eq!(find(&links, "c", "a").weight, 1.0);
        assert_eq!(find(&links, "b", "c").weight, 1.0);
        assert_eq!(find(&links, "c", "b").weight, 1.0);
    }

    #[test]
    fn test_symmetry_weight_and_link_data() {
        let signals = vec![
            detailed_signal("a", 2.0, &[("view", 3)]),
            detailed_signal("b", 4.0, &[("view", 1), ("purchase", 2)]),
        ];

        let links = GraphBuilder::new().build(&signals);

        let forward = find(&links, "a", "b");
        let backward = find(&links, "b", "a");
        assert_eq!(forward.weight, backward.weight);
        assert_eq!(forward.link_data, backward.link_data);
    }

    #[test]
    fn test_signal_counts_merged_with_num_users_one() {
        let signals = vec![
            detailed_signal("a", 2.0, &[("view", 3), ("purchase", 1)]),
            detailed_signal("b", 4.0, &[("view", 1)]),
        ];

        let links = GraphBuilder::new().build(&signals);

        let merged = find(&links, "a", "b").link_data.as_ref().unwrap();
        assert_eq!(merged.get("view"), Some(&4));
        assert_eq!(merged.get("purchase"), Some(&1));
        assert_eq!(merged.get(NUM_USERS_KEY), Some(&1));
    }

    #[test]
    fn test_num_users_overwritten_not_summed() {
        // Even if upstream maps already carry a NUM_USERS entry, one user
        // contributes exactly one unit of support.
        let signals = vec![
            detailed_signal("a", 2.0, &[(NUM_USERS_KEY, 5)]),
            detailed_signal("b", 4.0, &[(NUM_USERS_KEY, 7)]),
        ];

        let links = GraphBuilder::new().build(&signals);

        let merged = find(&links, "a", "b").link_data.as_ref().unwrap();
        assert_eq!(merged.get(NUM_USERS_KEY), Some(&1));
    }

    #[test]
    fn test_basic_mode_emits_no_link_data() {
        let links = GraphBuilder::new().build(&[signal("a", 1.0), signal("b", 2.0)]);

        assert!(links.iter().all(|l| l.link_data.is_none()));
    }

    #[test]
    fn test_mixed_presence_merges_against_empty() {
        let signals = vec![signal("a", 1.0), detailed_signal("b", 2.0, &[("view", 2)])];

        let links = GraphBuilder::new().build(&signals);

        let merged = find(&links, "a", "b").link_data.as_ref().unwrap();
        assert_eq!(merged.get("view"), Some(&2));
        assert_eq!(merged.get(NUM_USERS_KEY), Some(&1));
    }

    #[test]
    fn test_small_batches_emit_nothing() {
        let builder = GraphBuilder::new();

        assert!(builder.build(&[]).is_empty());
        assert!(builder.build(&[signal("a", 1.0)]).is_empty());
    }

    #[test]
    fn test_progress_reported_once_per_row() {
        let mut reporter = MockProgressReporter::new();
        reporter.expect_progress().times(3).return_const(());

        let signals = vec![signal("a", 1.0), signal("b", 2.0), signal("c", 3.0)];
        GraphBuilder::with_reporter(Arc::new(reporter)).build(&signals);
    }

    #[test]
    fn test_output_schema_tracks_input_detail() {
        let builder = GraphBuilder::new();

        let basic = builder.output_schema(&RecordSchema::interaction_signal());
        assert!(!basic.has_field("link_data"));

        let detailed = builder.output_schema(&RecordSchema::interaction_signal_detailed());
        assert!(detailed.has_field("link_data"));
        assert!(detailed.has_field("item_a"));
        assert!(detailed.has_field("item_b"));
    }
}
