// src/types.rs

use ahash::AHashMap;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

use crate::rank::Rank;

/// One report row, identified by its position in the original report and its
/// rank code. The row index doubles as the ordering and tie-break key
/// everywhere a "first match" rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub row: usize,
    pub rank: Rank,
}

impl Node {
    pub fn new(row: usize, rank: Rank) -> Self {
        Node { row, rank }
    }
}

// Serialized as a `[row, "rank"]` pair, the shape downstream consumers expect.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.row)?;
        tup.serialize_element(&self.rank.to_string())?;
        tup.end()
    }
}

/// Minimizer counts, present only when the source report carries the
/// two extra minimizer columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinimizerCounts {
    /// Minimizers in node + descendants.
    pub clade_minimizers: u64,
    /// Distinct minimizers at this node alone.
    pub self_minimizers: u64,
}

/// Per-node read-assignment data lifted from one report row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeStats {
    /// Reads in node + descendants.
    pub clade_reads: u64,
    /// Reads assigned directly to this node.
    pub self_reads: u64,
    pub tax_id: u32,
    pub minimizers: Option<MinimizerCounts>,
}

impl NodeStats {
    /// Comparison key for the parent-fallback rule: subterminals are ranked by
    /// clade reads first, direct reads second.
    pub fn read_count_key(&self) -> (u64, u64) {
        (self.clade_reads, self.self_reads)
    }
}

/// Report data keyed by node.
pub type StatsMap = AHashMap<Node, NodeStats>;

/// One selected reference, keyed in the output by the target's taxon id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Row index of the originating simple sub-tree's root.
    pub graph_idx: usize,
    /// Root node of the simple sub-tree the target was selected from.
    pub source: Node,
    pub source_taxid: u32,
    /// The chosen node.
    pub target: Node,
    /// True when the target is a subterminal fallback rather than a true leaf.
    pub parent_selected: bool,
    /// Taxon ids of every node in the simple sub-tree, row order.
    pub all_taxa: Vec<u32>,
    /// Root-to-target path as nodes.
    pub path: Vec<Node>,
    /// The same path as taxon ids.
    pub path_as_taxids: Vec<u32>,
}
