// src/lib.rs
pub mod errors;
pub mod output;
pub mod poll;
pub mod rank;
pub mod report;
pub mod select;
pub mod stats;
pub mod tree;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;

use crate::errors::K2rError;
use crate::poll::{poll, PollMethod};
use crate::report::{read_report, TaxReport};
use crate::select::assemble;
use crate::tree::TaxTree;
use crate::types::{Node, Selection};

/// Diagnostics recorded for each root tree in the report.
#[derive(Debug, Clone)]
pub struct TreeDiagnostics {
    pub root: Node,
    pub root_taxid: u32,
    /// Number of simple sub-trees this tree decomposed into (1 when the tree
    /// was already simple).
    pub simple_trees: usize,
}

/// Everything one analysis run produces. Selections are keyed by the target
/// taxon id; `BTreeMap` keeps the output deterministic.
#[derive(Debug)]
pub struct AnalysisResults {
    pub selections: BTreeMap<u32, Selection>,
    pub trees: Vec<TreeDiagnostics>,
    pub has_minimizer_data: bool,
}

impl AnalysisResults {
    pub fn selected_taxids(&self) -> Vec<u32> {
        self.selections.keys().copied().collect()
    }
}

/// Reads a report from disk and analyses it.
pub fn analyze_report<P: AsRef<Path>>(
    path: P,
    threshold: u64,
    method: PollMethod,
) -> Result<AnalysisResults, K2rError> {
    let report = read_report(path)?;
    analyze(&report, threshold, method)
}

/// Full pipeline over a parsed report: per root region, rebuild the tree,
/// decompose it into simple sub-trees, poll each one and assemble selection
/// records.
///
/// Regions are independent, so they are processed in parallel; merging stays
/// sequential in region order so taxon-id collisions resolve deterministically
/// (last write wins). A structurally broken region is logged and skipped
/// without aborting the run.
pub fn analyze(
    report: &TaxReport,
    threshold: u64,
    method: PollMethod,
) -> Result<AnalysisResults, K2rError> {
    let per_region: Vec<Result<(TreeDiagnostics, Vec<(u32, Selection)>), K2rError>> = report
        .regions
        .par_iter()
        .map(|region| analyze_region(region, report, threshold, method))
        .collect();

    let mut selections = BTreeMap::new();
    let mut trees = Vec::new();
    for result in per_region {
        match result {
            Ok((diagnostics, records)) => {
                log::debug!(
                    "tree rooted at row {} (taxid {}) yielded {} simple sub-tree(s)",
                    diagnostics.root.row,
                    diagnostics.root_taxid,
                    diagnostics.simple_trees
                );
                trees.push(diagnostics);
                for (taxid, selection) in records {
                    selections.insert(taxid, selection);
                }
            }
            Err(err) => log::error!("skipping malformed root tree: {err}"),
        }
    }

    Ok(AnalysisResults {
        selections,
        trees,
        has_minimizer_data: report.has_minimizer_data,
    })
}

fn analyze_region(
    region: &[Node],
    report: &TaxReport,
    threshold: u64,
    method: PollMethod,
) -> Result<(TreeDiagnostics, Vec<(u32, Selection)>), K2rError> {
    let tree = TaxTree::from_nodes(region.to_vec())?;
    let root = tree.root();
    let root_taxid = report
        .data
        .get(&root)
        .map(|stats| stats.tax_id)
        .unwrap_or_default();

    let simple_trees = if tree.complexity() == 0 {
        vec![tree]
    } else {
        tree.decompose()?
    };

    let mut records = Vec::new();
    for sub_tree in &simple_trees {
        let outcome = poll(sub_tree, &report.data, threshold, method);
        log::debug!(
            "polled sub-tree rooted at row {}: {:?} kept {} node(s), entropy {:.4} -> {:.4}",
            sub_tree.root().row,
            outcome.trace,
            outcome.selected.len(),
            outcome.entropy_pre,
            outcome.entropy_post
        );
        records.extend(assemble(sub_tree, &outcome, &report.data));
    }

    Ok((
        TreeDiagnostics {
            root,
            root_taxid,
            simple_trees: simple_trees.len(),
        },
        records,
    ))
}
