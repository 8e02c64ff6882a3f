use anyhow::{Context, Result};
use recsys_core::models::{AggregatedLink, CandidateRec, InteractionSignal, ItemLink};
use recsys_core::{Accumulator, Config, GraphBuilder, LinkAggregator, RecommendationRefiner};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Offline pipeline harness: stands in for the batch engine on one machine.
///
/// Reads line-delimited JSON `InteractionSignal` rows on stdin, runs the
/// three operators with the grouping and joins the engine would normally
/// perform between them, and writes refined recommendations as JSON lines.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("Failed to load config")?;
    info!(?config, "Starting offline recommendation pipeline");

    let signals = read_signals(io::stdin().lock())?;
    info!(signal_count = signals.len(), "Loaded interaction signals");

    // Stage 1: group by user, build each user's item-item edges.
    let by_user = group_by(signals, |s| s.user.clone());
    let builder = GraphBuilder::new();
    let mut links: Vec<ItemLink> = Vec::new();
    for user_signals in by_user.values() {
        links.extend(builder.build(user_signals));
    }
    info!(link_count = links.len(), users = by_user.len(), "Built item-item graph");

    // Stage 2: regroup by item_a, merge and filter. One aggregator instance
    // serves every group since evaluate() resets it between groups.
    let by_item_a = group_by(links, |l| l.item_a.clone());
    let mut aggregator = LinkAggregator::new(config.min_link_weight);
    let mut aggregated: BTreeMap<String, Vec<AggregatedLink>> = BTreeMap::new();
    for (item_a, group) in by_item_a {
        let merged = aggregator.evaluate(&group);
        if !merged.is_empty() {
            aggregated.insert(item_a, merged);
        }
    }
    info!(source_items = aggregated.len(), "Aggregated and filtered links");

    // Stage 3: join links back to each user's signals, then refine.
    let refiner = RecommendationRefiner::new(config.num_recs, config.diversity_adjust);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (user, user_signals) in &by_user {
        let candidates = join_candidates(user, user_signals, &aggregated);
        for rec in refiner.refine(user_signals, &candidates) {
            let line = serde_json::to_string(&rec).context("Failed to encode output record")?;
            writeln!(out, "{}", line)?;
        }
    }

    Ok(())
}

fn read_signals(input: impl BufRead) -> Result<Vec<InteractionSignal>> {
    let mut signals = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let signal: InteractionSignal = serde_json::from_str(&line)
            .with_context(|| format!("Malformed signal on line {}", line_no + 1))?;
        signals.push(signal);
    }
    Ok(signals)
}

fn group_by<T, F: Fn(&T) -> String>(rows: Vec<T>, key: F) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(&row)).or_default().push(row);
    }
    groups
}

/// The user↔link join the engine performs between the aggregation and
/// refinement stages: each seen item seeds candidates from its aggregated
/// neighbors, with the seed item recorded as the recommendation's reason.
fn join_candidates(
    user: &str,
    user_signals: &[InteractionSignal],
    aggregated: &BTreeMap<String, Vec<AggregatedLink>>,
) -> Vec<CandidateRec> {
    let mut candidates = Vec::new();
    for signal in user_signals {
        let Some(neighbors) = aggregated.get(&signal.item) else {
            continue;
        };
        for link in neighbors {
            candidates.push(CandidateRec {
                user: user.to_string(),
                item: link.item_b.clone(),
                weight: signal.weight * link.weight,
                reason: Some(signal.item.clone()),
                user_link: signal.weight,
                item_link: link.weight,
            });
        }
    }
    candidates
}
