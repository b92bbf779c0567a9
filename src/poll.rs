// src/poll.rs

use std::fmt;

use crate::stats;
use crate::tree::TaxTree;
use crate::types::{Node, StatsMap};

/// Gap limit seeding the descending step scan.
const STEP_GAP_LIMIT: f64 = 65_535.0;

/// How many centroid-distant candidates the kmeans rule examines.
const KMEANS_TOP_N: usize = 5;

/// Requested polling strategy. Unknown names fall back to kmeans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMethod {
    Max,
    Skew,
    Tiles,
    Kmeans,
}

impl PollMethod {
    pub fn parse(name: &str) -> PollMethod {
        match name.to_ascii_lowercase().as_str() {
            "max" => PollMethod::Max,
            "skew" => PollMethod::Skew,
            "tiles" => PollMethod::Tiles,
            "kmeans" => PollMethod::Kmeans,
            other => {
                log::warn!("invalid polling method {other:?}, defaulting to kmeans");
                PollMethod::Kmeans
            }
        }
    }
}

impl fmt::Display for PollMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollMethod::Max => "max",
            PollMethod::Skew => "skew",
            PollMethod::Tiles => "tiles",
            PollMethod::Kmeans => "kmeans",
        };
        f.write_str(name)
    }
}

/// Decisions taken while polling one tree, in order. Replaces the inline
/// logging of classification modes; the driver emits these at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Singleton,
    ParentFallback,
    NoCandidates,
    Max,
    Skew,
    Step,
    Conservative,
    Tiles,
    Kmeans,
}

/// Result of polling one simple tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// Accepted nodes, row order. May be empty.
    pub selected: Vec<Node>,
    /// True when the selection fell back to subterminal ancestors.
    pub parent_selected: bool,
    /// Shannon entropy of the candidate distribution before filtering.
    pub entropy_pre: f64,
    /// Shannon entropy of the retained subset, renormalized.
    pub entropy_post: f64,
    pub trace: Vec<PollMode>,
}

impl PollOutcome {
    fn empty(trace: Vec<PollMode>) -> Self {
        PollOutcome {
            selected: Vec::new(),
            parent_selected: false,
            entropy_pre: 0.0,
            entropy_post: 0.0,
            trace,
        }
    }
}

/// Decides which node(s) of a simple tree are genuine references.
///
/// Leaves whose direct read count exceeds `threshold` are the candidates. A
/// single candidate is selected outright; none at all triggers the
/// subterminal fallback; more than one goes through the requested statistical
/// method. Zero candidates at any stage is a legitimate empty outcome.
pub fn poll(tree: &TaxTree, data: &StatsMap, threshold: u64, method: PollMethod) -> PollOutcome {
    let leaves = tree.leaves();
    let valid: Vec<(Node, u64)> = leaves
        .iter()
        .filter_map(|leaf| {
            let node = data.get(leaf)?;
            (node.self_reads > threshold).then_some((*leaf, node.self_reads))
        })
        .collect();

    match valid.len() {
        0 => parent_fallback(tree, data, threshold, leaves.len()),
        1 => PollOutcome {
            selected: vec![valid[0].0],
            parent_selected: false,
            entropy_pre: 0.0,
            entropy_post: 0.0,
            trace: vec![PollMode::Singleton],
        },
        _ => poll_candidates(&valid, method),
    }
}

/// No leaf passed the threshold: jump one level up and consider subterminals
/// by clade reads. Only meaningful when the tree actually branches (more than
/// one leaf); the winners are the subterminal(s) with the maximum read-count
/// tuple, ties kept.
fn parent_fallback(tree: &TaxTree, data: &StatsMap, threshold: u64, leaf_count: usize) -> PollOutcome {
    let candidates: Vec<(Node, (u64, u64))> = tree
        .subterminals()
        .iter()
        .filter_map(|sub| {
            let node = data.get(sub)?;
            (node.clade_reads > threshold).then_some((*sub, node.read_count_key()))
        })
        .collect();

    if leaf_count <= 1 {
        return PollOutcome::empty(vec![PollMode::NoCandidates]);
    }
    let Some(best) = candidates.iter().map(|&(_, key)| key).max() else {
        return PollOutcome::empty(vec![PollMode::NoCandidates]);
    };
    let selected = candidates
        .into_iter()
        .filter(|&(_, key)| key == best)
        .map(|(node, _)| node)
        .collect();
    PollOutcome {
        selected,
        parent_selected: true,
        entropy_pre: 0.0,
        entropy_post: 0.0,
        trace: vec![PollMode::ParentFallback],
    }
}

fn poll_candidates(candidates: &[(Node, u64)], method: PollMethod) -> PollOutcome {
    let dist: Vec<f64> = candidates.iter().map(|&(_, count)| count as f64).collect();
    let total: f64 = dist.iter().sum();
    let prob: Vec<f64> = dist.iter().map(|count| count / total).collect();
    let entropy_pre = stats::shannon_entropy(&dist);

    let mut trace = vec![match method {
        PollMethod::Max => PollMode::Max,
        PollMethod::Skew => PollMode::Skew,
        PollMethod::Tiles => PollMode::Tiles,
        PollMethod::Kmeans => PollMode::Kmeans,
    }];

    let keep: Vec<usize> = match method {
        PollMethod::Max => vec![argmax_first(&dist)],
        PollMethod::Skew => skew_filter(&dist, &prob, &mut trace),
        PollMethod::Tiles => tiles_filter(&dist),
        PollMethod::Kmeans => kmeans_filter(&dist),
    };

    let kept_counts: Vec<f64> = keep.iter().map(|&i| dist[i]).collect();
    let entropy_post = stats::shannon_entropy(&kept_counts);
    let mut selected: Vec<Node> = keep.iter().map(|&i| candidates[i].0).collect();
    selected.sort();

    PollOutcome {
        selected,
        parent_selected: false,
        entropy_pre,
        entropy_post,
        trace,
    }
}

/// First index (candidate order = row order) holding the maximum count.
fn argmax_first(dist: &[f64]) -> usize {
    let mut best = 0;
    for (i, &count) in dist.iter().enumerate() {
        if count > dist[best] {
            best = i;
        }
    }
    best
}

/// Skewness-significance dispatch. The test needs at least 8 samples, so a
/// short probability vector is padded with trailing zeros; the padding
/// happens on a copy so the working distribution never grows, and entropy
/// diagnostics stay on the un-padded vector.
fn skew_filter(dist: &[f64], prob: &[f64], trace: &mut Vec<PollMode>) -> Vec<usize> {
    let mut padded = prob.to_vec();
    if padded.len() < 8 {
        padded.resize(8, 0.0);
    }
    let p_value = stats::skew_test(&padded).map(|(_, p)| p).unwrap_or(1.0);
    log::debug!("skew test p-value = {p_value}");

    if p_value < 0.005 {
        trace.push(PollMode::Max);
        vec![argmax_first(dist)]
    } else if p_value < 0.05 {
        trace.push(PollMode::Step);
        step_cut(dist)
    } else {
        trace.push(PollMode::Conservative);
        conservative_cut(dist)
    }
}

/// Descending gap scan: walk counts from the top, carrying the last nonzero
/// gap (seeded at `STEP_GAP_LIMIT`); the first gap larger than the carried
/// one cuts, retaining everything above it. No cut retains the whole set.
fn step_cut(dist: &[f64]) -> Vec<usize> {
    let order = sorted_indices(dist, true);
    let mut carried_gap = STEP_GAP_LIMIT;
    let mut cut = order.len();
    for k in 0..order.len() - 1 {
        let gap = dist[order[k]] - dist[order[k + 1]];
        if gap > carried_gap {
            cut = k + 1;
            break;
        } else if gap != 0.0 {
            carried_gap = gap;
        }
    }
    order[..cut].to_vec()
}

/// Ascending step scan: track the running maximum step upward; the first step
/// that is neither zero nor the running maximum and does not become a new
/// maximum marks the cut. Retains the high cluster from the cut upward; no
/// cut retains the whole set.
fn conservative_cut(dist: &[f64]) -> Vec<usize> {
    let order = sorted_indices(dist, false);
    let mut max_step = 0.0f64;
    let mut cut = 0;
    for k in 0..order.len() - 1 {
        let step = dist[order[k + 1]] - dist[order[k]];
        if step > max_step {
            max_step = step;
        } else if step != 0.0 && step != max_step {
            cut = k;
            break;
        }
    }
    order[cut..].to_vec()
}

/// Quartile fence rule: retain counts strictly above Q3 + 1.5 * IQR.
fn tiles_filter(dist: &[f64]) -> Vec<usize> {
    let q1 = stats::quantile(dist, 0.25);
    let q3 = stats::quantile(dist, 0.75);
    let fence = q3 + 1.5 * (q3 - q1);
    log::debug!("upper quartile fence = {fence}");
    (0..dist.len()).filter(|&i| dist[i] > fence).collect()
}

/// Single-cluster centroid rule: the centroid of one cluster is the mean, so
/// rank candidates by distance from the mean, take the `KMEANS_TOP_N` most
/// distant, and keep those above the median of the full distribution.
fn kmeans_filter(dist: &[f64]) -> Vec<usize> {
    let centroid = stats::mean(dist);
    let med = stats::median(dist);
    let mut order: Vec<usize> = (0..dist.len()).collect();
    order.sort_by(|&a, &b| {
        let da = (dist[a] - centroid).abs();
        let db = (dist[b] - centroid).abs();
        db.total_cmp(&da).then(a.cmp(&b))
    });
    order
        .into_iter()
        .take(KMEANS_TOP_N)
        .filter(|&i| dist[i] > med)
        .collect()
}

/// Candidate indices sorted by count; ties stay in row order.
fn sorted_indices(dist: &[f64], descending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dist.len()).collect();
    order.sort_by(|&a, &b| {
        let cmp = if descending {
            dist[b].total_cmp(&dist[a])
        } else {
            dist[a].total_cmp(&dist[b])
        };
        cmp.then(a.cmp(&b))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::Rank;
    use crate::types::NodeStats;

    const RANDOM_FREQS1: [u64; 100] = [
        369, 891, 463, 281, 258, 534, 615, 855, 699, 936, 106, 498, 451, 744, 752, 341, 343, 613,
        674, 523, 731, 464, 675, 215, 480, 798, 897, 516, 881, 610, 828, 793, 615, 234, 811, 334,
        712, 505, 221, 149, 784, 466, 592, 343, 256, 628, 878, 716, 856, 138, 830, 137, 314, 150,
        374, 662, 146, 561, 509, 124, 154, 894, 983, 886, 289, 238, 350, 696, 295, 969, 910, 752,
        240, 128, 251, 781, 367, 445, 934, 848, 813, 880, 435, 929, 187, 293, 689, 338, 623, 197,
        75, 89, 96, 93, 61, 74, 86, 8362, 7050, 5008,
    ];

    fn n(row: usize, code: &str) -> Node {
        Node::new(row, Rank::parse(code).unwrap())
    }

    fn leaf_stats(clade: u64, this: u64, tax_id: u32) -> NodeStats {
        NodeStats {
            clade_reads: clade,
            self_reads: this,
            tax_id,
            minimizers: None,
        }
    }

    /// Stem of three nodes plus one hundred S3 leaves carrying `freqs`.
    fn wide_fixture(freqs: &[u64]) -> (TaxTree, StatsMap) {
        let mut nodes = vec![n(11, "S"), n(12, "S1"), n(13, "S2")];
        let mut data = StatsMap::default();
        for (i, node) in nodes.iter().enumerate() {
            data.insert(*node, leaf_stats(0, 0, 8997 + i as u32));
        }
        for (i, &freq) in freqs.iter().enumerate() {
            let node = n(14 + i, "S3");
            nodes.push(node);
            data.insert(node, leaf_stats(freq, freq, 9000 + i as u32));
        }
        (TaxTree::from_nodes(nodes).unwrap(), data)
    }

    fn selected_rows(outcome: &PollOutcome) -> Vec<usize> {
        outcome.selected.iter().map(|node| node.row).collect()
    }

    #[test]
    fn skew_collapses_to_max_on_extreme_tail() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        let outcome = poll(&tree, &data, 100, PollMethod::Skew);
        assert_eq!(selected_rows(&outcome), vec![111]);
        assert_eq!(outcome.trace, vec![PollMode::Skew, PollMode::Max]);
        assert!(!outcome.parent_selected);
        assert!(outcome.entropy_pre > 0.0);
        assert_eq!(outcome.entropy_post, 0.0);
    }

    #[test]
    fn skew_goes_conservative_on_weak_evidence() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        let outcome = poll(&tree, &data, 900, PollMethod::Skew);
        // Nine leaves clear 900; the ascending scan drops only the lowest.
        assert_eq!(
            selected_rows(&outcome),
            vec![23, 76, 83, 92, 97, 111, 112, 113]
        );
        assert_eq!(outcome.trace, vec![PollMode::Skew, PollMode::Conservative]);
    }

    #[test]
    fn tiles_keeps_only_upper_outliers() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        let outcome = poll(&tree, &data, 100, PollMethod::Tiles);
        assert_eq!(selected_rows(&outcome), vec![111, 112, 113]);

        let outcome = poll(&tree, &data, 900, PollMethod::Tiles);
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.entropy_post, 0.0);
        assert!(outcome.entropy_pre > 0.0);
    }

    #[test]
    fn kmeans_keeps_distant_high_counts() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        let outcome = poll(&tree, &data, 100, PollMethod::Kmeans);
        assert_eq!(selected_rows(&outcome), vec![111, 112, 113]);

        let outcome = poll(&tree, &data, 900, PollMethod::Kmeans);
        assert_eq!(selected_rows(&outcome), vec![111, 112, 113]);
    }

    #[test]
    fn max_takes_first_highest_in_row_order() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        let outcome = poll(&tree, &data, 100, PollMethod::Max);
        assert_eq!(selected_rows(&outcome), vec![111]);
        assert_eq!(outcome.trace, vec![PollMode::Max]);
    }

    #[test]
    fn single_valid_leaf_skips_polling() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        for method in [
            PollMethod::Max,
            PollMethod::Skew,
            PollMethod::Tiles,
            PollMethod::Kmeans,
        ] {
            let outcome = poll(&tree, &data, 8000, method);
            assert_eq!(selected_rows(&outcome), vec![111]);
            assert_eq!(outcome.trace, vec![PollMode::Singleton]);
            assert_eq!(outcome.entropy_pre, 0.0);
            assert_eq!(outcome.entropy_post, 0.0);
        }
    }

    #[test]
    fn skew_pads_short_vectors_without_growing_them() {
        // Three equal candidates: symmetric enough that the padded test stays
        // above p = 0.05 and the conservative scan finds nothing to cut.
        let (tree, data) = wide_fixture(&[1000, 1000, 1000]);
        let outcome = poll(&tree, &data, 100, PollMethod::Skew);
        assert_eq!(selected_rows(&outcome), vec![14, 15, 16]);
        assert_eq!(outcome.trace, vec![PollMode::Skew, PollMode::Conservative]);
        // Entropy comes from the three real candidates, not the padded eight.
        assert!((outcome.entropy_pre - 3.0f64.ln()).abs() < 1e-12);
        assert!((outcome.entropy_post - 3.0f64.ln()).abs() < 1e-12);

        // Repeated polls are byte-identical; padding must not leak state.
        let again = poll(&tree, &data, 100, PollMethod::Skew);
        assert_eq!(outcome, again);
    }

    #[test]
    fn skew_padded_dominant_candidate_goes_max() {
        let (tree, data) = wide_fixture(&[100, 200, 5000]);
        let outcome = poll(&tree, &data, 50, PollMethod::Skew);
        assert_eq!(selected_rows(&outcome), vec![16]);
        assert_eq!(outcome.trace, vec![PollMode::Skew, PollMode::Max]);
    }

    #[test]
    fn conservative_cut_separates_clusters() {
        let (tree, data) = wide_fixture(&[100, 110, 5000, 5200]);
        let outcome = poll(&tree, &data, 50, PollMethod::Skew);
        assert_eq!(outcome.trace, vec![PollMode::Skew, PollMode::Conservative]);
        assert_eq!(selected_rows(&outcome), vec![16, 17]);
    }

    #[test]
    fn parent_fallback_selects_best_subterminal() {
        // Two leaves below threshold, subterminal clade count above it.
        let mut data = StatsMap::default();
        let nodes = vec![n(0, "S"), n(1, "S1"), n(2, "S2"), n(3, "S2")];
        data.insert(nodes[0], leaf_stats(500, 0, 100));
        data.insert(nodes[1], leaf_stats(500, 0, 101));
        data.insert(nodes[2], leaf_stats(40, 40, 102));
        data.insert(nodes[3], leaf_stats(35, 35, 103));
        let tree = TaxTree::from_nodes(nodes).unwrap();

        let outcome = poll(&tree, &data, 50, PollMethod::Kmeans);
        assert_eq!(selected_rows(&outcome), vec![1]);
        assert!(outcome.parent_selected);
        assert_eq!(outcome.trace, vec![PollMode::ParentFallback]);
        assert_eq!(outcome.entropy_pre, 0.0);
        assert_eq!(outcome.entropy_post, 0.0);
    }

    #[test]
    fn parent_fallback_needs_branching() {
        // A single-leaf chain never falls back to its parent.
        let mut data = StatsMap::default();
        let nodes = vec![n(0, "S"), n(1, "S1"), n(2, "S2")];
        data.insert(nodes[0], leaf_stats(500, 0, 100));
        data.insert(nodes[1], leaf_stats(500, 0, 101));
        data.insert(nodes[2], leaf_stats(40, 40, 102));
        let tree = TaxTree::from_nodes(nodes).unwrap();

        let outcome = poll(&tree, &data, 50, PollMethod::Kmeans);
        assert!(outcome.selected.is_empty());
        assert!(!outcome.parent_selected);
        assert_eq!(outcome.trace, vec![PollMode::NoCandidates]);
    }

    #[test]
    fn subterminals_below_threshold_yield_nothing() {
        let mut data = StatsMap::default();
        let nodes = vec![n(0, "S"), n(1, "S1"), n(2, "S2"), n(3, "S2")];
        data.insert(nodes[0], leaf_stats(30, 0, 100));
        data.insert(nodes[1], leaf_stats(30, 0, 101));
        data.insert(nodes[2], leaf_stats(10, 10, 102));
        data.insert(nodes[3], leaf_stats(20, 20, 103));
        let tree = TaxTree::from_nodes(nodes).unwrap();

        let outcome = poll(&tree, &data, 50, PollMethod::Tiles);
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.trace, vec![PollMode::NoCandidates]);
    }

    #[test]
    fn unknown_method_falls_back_to_kmeans() {
        assert_eq!(PollMethod::parse("bogus"), PollMethod::Kmeans);
        assert_eq!(PollMethod::parse("SKEW"), PollMethod::Skew);
        assert_eq!(PollMethod::parse("Tiles"), PollMethod::Tiles);
    }

    #[test]
    fn polling_is_deterministic_across_reruns() {
        let (tree, data) = wide_fixture(&RANDOM_FREQS1);
        for method in [
            PollMethod::Max,
            PollMethod::Skew,
            PollMethod::Tiles,
            PollMethod::Kmeans,
        ] {
            let first = poll(&tree, &data, 100, method);
            let second = poll(&tree, &data, 100, method);
            assert_eq!(first, second);
        }
    }
}
