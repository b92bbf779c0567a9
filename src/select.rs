// src/select.rs

use crate::poll::PollOutcome;
use crate::tree::TaxTree;
use crate::types::{Selection, StatsMap};

/// Builds one `Selection` record per accepted node of a simple tree.
///
/// Records are returned keyed by the target's taxon id, in acceptance order;
/// the caller merges them into the run-wide map where a later record for the
/// same taxon id overwrites an earlier one.
pub fn assemble(tree: &TaxTree, outcome: &PollOutcome, data: &StatsMap) -> Vec<(u32, Selection)> {
    if outcome.selected.is_empty() {
        return Vec::new();
    }

    let root = tree.root();
    let source_taxid = data.get(&root).map(|s| s.tax_id).unwrap_or_default();
    let all_taxa: Vec<u32> = tree
        .nodes()
        .iter()
        .filter_map(|node| data.get(node).map(|s| s.tax_id))
        .collect();

    let mut records = Vec::with_capacity(outcome.selected.len());
    for &target in &outcome.selected {
        let Some(target_stats) = data.get(&target) else {
            log::debug!("no report data for selected node at row {}", target.row);
            continue;
        };
        let Some(path) = tree.all_paths(root, target).into_iter().next() else {
            log::debug!("selected node at row {} unreachable from root", target.row);
            continue;
        };
        let path_as_taxids: Vec<u32> = path
            .iter()
            .filter_map(|node| data.get(node).map(|s| s.tax_id))
            .collect();
        records.push((
            target_stats.tax_id,
            Selection {
                graph_idx: root.row,
                source: root,
                source_taxid,
                target,
                parent_selected: outcome.parent_selected,
                all_taxa: all_taxa.clone(),
                path,
                path_as_taxids,
            },
        ));
    }
    records
}
