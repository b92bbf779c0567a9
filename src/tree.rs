// src/tree.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::K2rError;
use crate::rank::Rank;
use crate::types::Node;

/// A rooted taxonomy tree rebuilt from one root region of a report.
///
/// Nodes live in a row-sorted arena (`nodes`, index 0 is the root) and edges
/// are arena-index adjacency lists in discovery order. Every tree is checked
/// for structural complexity at construction time.
#[derive(Debug, Clone)]
pub struct TaxTree {
    nodes: Vec<Node>,
    children: Vec<Vec<usize>>,
    complexity: u8,
}

impl TaxTree {
    /// Rebuilds a tree from a pre-ordered node sequence.
    ///
    /// Walks consecutive pairs: a deeper rank is a direct child of the
    /// previous node; a return to the same or a shallower rank marks a branch
    /// point, and the true parent is the most recent earlier node one rank
    /// above the current one (pre-order guarantees the last-seen match is the
    /// correct ancestor). Fails with `MalformedSequence` when no such
    /// ancestor exists in the consumed prefix.
    pub fn from_nodes(mut nodes: Vec<Node>) -> Result<Self, K2rError> {
        if nodes.is_empty() {
            return Err(K2rError::NoData);
        }
        nodes.sort();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

        for cur in 1..nodes.len() {
            let prev = cur - 1;
            if nodes[cur].rank > nodes[prev].rank {
                children[prev].push(cur);
                continue;
            }
            let parent_rank = nodes[cur].rank.sub(1);
            let parent = (0..cur)
                .rev()
                .find(|&j| nodes[j].rank == parent_rank)
                .ok_or(K2rError::MalformedSequence {
                    row: nodes[cur].row,
                    rank: parent_rank,
                })?;
            children[parent].push(cur);
        }

        let complexity = compute_complexity(&nodes, &children);
        Ok(TaxTree {
            nodes,
            children,
            complexity,
        })
    }

    pub fn root(&self) -> Node {
        self.nodes[0]
    }

    /// All nodes in row order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Branching-shape score: 0 = branching confined to leaves of one rank,
    /// 1 = multiple nodes at the rank just above the single leaf rank,
    /// 2 = leaves at more than one distinct rank.
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    fn index_of(&self, node: Node) -> Option<usize> {
        self.nodes.binary_search(&node).ok()
    }

    pub fn children_of(&self, node: Node) -> Vec<Node> {
        match self.index_of(node) {
            Some(idx) => self.children[idx].iter().map(|&c| self.nodes[c]).collect(),
            None => Vec::new(),
        }
    }

    /// Childless nodes, row order.
    pub fn leaves(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .zip(&self.children)
            .filter(|(_, kids)| kids.is_empty())
            .map(|(&n, _)| n)
            .collect()
    }

    /// Nodes one rank above a leaf rank that still have children, row order.
    pub fn subterminals(&self) -> Vec<Node> {
        let sub_ranks: BTreeSet<Rank> = self
            .leaf_ranks()
            .into_iter()
            .map(|r| r.sub(1))
            .collect();
        self.nodes
            .iter()
            .zip(&self.children)
            .filter(|(n, kids)| sub_ranks.contains(&n.rank) && !kids.is_empty())
            .map(|(&n, _)| n)
            .collect()
    }

    fn leaf_ranks(&self) -> BTreeSet<Rank> {
        self.nodes
            .iter()
            .zip(&self.children)
            .filter(|(_, kids)| kids.is_empty())
            .map(|(n, _)| n.rank)
            .collect()
    }

    /// Every simple path from `source` to `target`. In a well-formed tree at
    /// most one exists; the result is empty when `target` is unreachable.
    pub fn all_paths(&self, source: Node, target: Node) -> Vec<Vec<Node>> {
        let (Some(src), Some(dst)) = (self.index_of(source), self.index_of(target)) else {
            return Vec::new();
        };
        let mut paths = Vec::new();
        let mut current = Vec::new();
        self.walk_paths(src, dst, &mut current, &mut paths);
        paths
    }

    fn walk_paths(&self, at: usize, dst: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<Node>>) {
        current.push(at);
        if at == dst {
            out.push(current.iter().map(|&i| self.nodes[i]).collect());
        } else {
            for &child in &self.children[at] {
                if !current.contains(&child) {
                    self.walk_paths(child, dst, current, out);
                }
            }
        }
        current.pop();
    }

    /// The shallowest rank occupied by more than one node, if any.
    fn multiplicity_rank(&self) -> Option<Rank> {
        let mut counts: BTreeMap<Rank, usize> = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.rank).or_default() += 1;
        }
        counts.into_iter().find(|&(_, c)| c > 1).map(|(r, _)| r)
    }

    /// Splits the tree at every node of rank `at`. Each part is the root
    /// lineage down to one split node plus that node's children, keeping one
    /// extra grandchild layer so degenerate single-child chains collapse
    /// correctly. With fewer than two nodes at `at` the tree is returned
    /// unchanged.
    pub fn split_at(&self, at: Rank) -> Result<Vec<TaxTree>, K2rError> {
        let split_points: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].rank == at)
            .collect();
        if split_points.len() < 2 {
            log::debug!("cannot split tree rooted at row {} at {at}", self.root().row);
            return Ok(vec![self.clone()]);
        }

        let mut parts = Vec::with_capacity(split_points.len());
        for sp in split_points {
            let Some(mut part_nodes) = self
                .all_paths(self.root(), self.nodes[sp])
                .into_iter()
                .next()
            else {
                continue;
            };
            for &child in &self.children[sp] {
                part_nodes.push(self.nodes[child]);
                if !self.children[child].is_empty() {
                    part_nodes.extend(self.children[child].iter().map(|&g| self.nodes[g]));
                }
            }
            parts.push(TaxTree::from_nodes(part_nodes)?);
        }
        Ok(parts)
    }

    /// Recursively splits at the multiplicity rank until every part has
    /// complexity 0. Lineage nodes above the split are duplicated into every
    /// part; decomposition is a fan-out, not a partition.
    pub fn decompose(&self) -> Result<Vec<TaxTree>, K2rError> {
        let mut out = Vec::new();
        self.decompose_into(&mut out)?;
        Ok(out)
    }

    fn decompose_into(&self, out: &mut Vec<TaxTree>) -> Result<(), K2rError> {
        // No rank with multiplicity means nothing to split; emit as-is.
        let Some(rank) = self.multiplicity_rank() else {
            out.push(self.clone());
            return Ok(());
        };
        for part in self.split_at(rank)? {
            if part.complexity() == 0 {
                out.push(part);
            } else {
                log::debug!(
                    "decomposing part rooted at row {} further (complexity {})",
                    part.root().row,
                    part.complexity()
                );
                part.decompose_into(out)?;
            }
        }
        Ok(())
    }
}

fn compute_complexity(nodes: &[Node], children: &[Vec<usize>]) -> u8 {
    let leaf_ranks: BTreeSet<Rank> = nodes
        .iter()
        .zip(children)
        .filter(|(_, kids)| kids.is_empty())
        .map(|(n, _)| n.rank)
        .collect();
    if leaf_ranks.len() > 1 {
        return 2;
    }
    let Some(&leaf_rank) = leaf_ranks.iter().next() else {
        return 0;
    };
    let indicator = leaf_rank.sub(1);
    let width = nodes.iter().filter(|n| n.rank == indicator).count();
    if width > 1 {
        1
    } else {
        0
    }
}
