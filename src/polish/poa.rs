//! Reference-anchored partial-order alignment graph.
//!
//! One node per reference base plus a prefix node at index 0. Node `i > 0`
//! holds reference base `i - 1`; inserts and deletes stored on node `i`
//! happen immediately after that base (after nothing, for the prefix node).

use std::fmt::Write as _;

use crate::params::PolishParams;
use crate::polish::pairwise::AlignedPair;
use crate::polish::symbol::{Symbol, SYMBOL_COUNT};

/// Insert observed immediately after a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PoaInsert {
    /// Inserted bases, left-aligned.
    pub insert: Vec<u8>,
    /// Accumulated weight.
    pub weight: f64,
}

/// Delete starting immediately after a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PoaDelete {
    /// Number of reference bases deleted.
    pub length: usize,
    /// Accumulated weight.
    pub weight: f64,
}

/// A single read base aligned to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoaObservation {
    /// Index of the read in the read set.
    pub read_no: usize,
    /// Offset of the base in the read.
    pub offset: usize,
    /// Weight contributed: the posterior scaled by the read base's weight.
    pub weight: f64,
    /// Posterior probability of the aligned pair.
    pub posterior: f64,
}

/// Graph node for one reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct PoaNode {
    /// Reference base (`N` for the prefix node).
    pub base: u8,
    /// Accumulated weight per symbol, indexed by [`Symbol::index`].
    pub base_weights: [f64; SYMBOL_COUNT],
    /// Inserts after this node.
    pub inserts: Vec<PoaInsert>,
    /// Deletes starting after this node.
    pub deletes: Vec<PoaDelete>,
    /// Individual read bases aligned here.
    pub observations: Vec<PoaObservation>,
}

impl PoaNode {
    fn new(base: u8) -> Self {
        Self {
            base,
            base_weights: [0.0; SYMBOL_COUNT],
            inserts: Vec::new(),
            deletes: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// Sum of the weights over all symbols.
    pub fn total_base_weight(&self) -> f64 {
        self.base_weights.iter().sum()
    }

    fn add_insert(&mut self, insert: Vec<u8>, weight: f64) {
        match self.inserts.iter_mut().find(|existing| existing.insert == insert) {
            Some(existing) => existing.weight += weight,
            None => self.inserts.push(PoaInsert { insert, weight }),
        }
    }

    fn add_delete(&mut self, length: usize, weight: f64) {
        match self.deletes.iter_mut().find(|existing| existing.length == length) {
            Some(existing) => existing.weight += weight,
            None => self.deletes.push(PoaDelete { length, weight }),
        }
    }

    /// Heaviest insert; ties go to the lexicographically smallest bases.
    pub fn heaviest_insert(&self) -> Option<&PoaInsert> {
        self.inserts.iter().fold(None, |best: Option<&PoaInsert>, candidate| match best {
            Some(b)
                if b.weight > candidate.weight
                    || (b.weight == candidate.weight && b.insert <= candidate.insert) =>
            {
                Some(b)
            }
            _ => Some(candidate),
        })
    }

    /// Heaviest delete; ties go to the shorter delete.
    pub fn heaviest_delete(&self) -> Option<&PoaDelete> {
        self.deletes.iter().fold(None, |best: Option<&PoaDelete>, candidate| match best {
            Some(b)
                if b.weight > candidate.weight
                    || (b.weight == candidate.weight && b.length <= candidate.length) =>
            {
                Some(b)
            }
            _ => Some(candidate),
        })
    }
}

/// Consensus sequence with maps to and from the graph reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    /// Consensus bases.
    pub sequence: Vec<u8>,
    /// For each consensus position, the reference position it derives from
    /// (`None` for inserted bases).
    pub consensus_to_reference: Vec<Option<usize>>,
    /// For each reference position, its consensus position (`None` if deleted).
    pub reference_to_consensus: Vec<Option<usize>>,
}

impl Consensus {
    /// Consensus position of a reference position.
    ///
    /// # Panics
    /// If `reference_position` is outside the graph reference.
    pub fn consensus_position(&self, reference_position: usize) -> Option<usize> {
        assert!(
            reference_position < self.reference_to_consensus.len(),
            "reference position {reference_position} outside reference of length {}",
            self.reference_to_consensus.len()
        );
        self.reference_to_consensus[reference_position]
    }

    /// Reference position a consensus position derives from.
    ///
    /// # Panics
    /// If `consensus_position` is outside the consensus.
    pub fn reference_position(&self, consensus_position: usize) -> Option<usize> {
        assert!(
            consensus_position < self.consensus_to_reference.len(),
            "consensus position {consensus_position} outside consensus of length {}",
            self.consensus_to_reference.len()
        );
        self.consensus_to_reference[consensus_position]
    }
}

/// Aggregate weights of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoaSummary {
    /// Reference length.
    pub reference_length: usize,
    /// Weight of read bases agreeing with the reference base.
    pub reference_match_weight: f64,
    /// Weight of read bases disagreeing with the reference base.
    pub disagreement_weight: f64,
    /// Total insert weight.
    pub insert_weight: f64,
    /// Total delete weight.
    pub delete_weight: f64,
    /// Number of observations.
    pub observations: usize,
}

impl PoaSummary {
    /// Fraction of aligned weight disagreeing with the reference, `None` when
    /// nothing is aligned.
    pub fn disagreement_rate(&self) -> Option<f64> {
        let total = self.reference_match_weight + self.disagreement_weight;
        if total > 0.0 {
            Some(self.disagreement_weight / total)
        } else {
            None
        }
    }
}

/// Partial-order alignment graph over a reference sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Poa {
    reference: Vec<u8>,
    nodes: Vec<PoaNode>,
}

impl Poa {
    /// Graph with one node per reference base plus the prefix node; all weights zero.
    pub fn reference_graph(reference: &[u8]) -> Self {
        let mut nodes = Vec::with_capacity(reference.len() + 1);
        nodes.push(PoaNode::new(b'N'));
        nodes.extend(reference.iter().map(|&base| PoaNode::new(base)));
        Self {
            reference: reference.to_vec(),
            nodes,
        }
    }

    /// The graph reference.
    pub fn reference(&self) -> &[u8] {
        &self.reference
    }

    /// All nodes, prefix node first.
    pub fn nodes(&self) -> &[PoaNode] {
        &self.nodes
    }

    /// Node at `index` (0 is the prefix node).
    pub fn node(&self, index: usize) -> &PoaNode {
        &self.nodes[index]
    }

    /// Fold one read's aligned pairs into the graph, taking each pair's
    /// weight as is.
    ///
    /// Inserts sharing a reference coordinate with consecutive read
    /// coordinates form one insert; deletes sharing a read coordinate with
    /// consecutive reference coordinates form one delete. Each is weighted by
    /// the mean weight of its pairs and credited at its leftmost equivalent
    /// position.
    pub fn augment(
        &mut self,
        read: &[u8],
        read_no: usize,
        matches: &[AlignedPair],
        inserts: &[AlignedPair],
        deletes: &[AlignedPair],
    ) {
        self.augment_with(read, read_no, matches, inserts, deletes, |_| 1.0, |_| 1.0);
    }

    /// [`Poa::augment`] for pairs carrying posterior probabilities, scaled by
    /// the confidence of the read bases involved.
    ///
    /// Matches and inserts are scaled by `base_weights[y]`; a delete, which
    /// sits between read bases `y - 1` and `y`, by the mean weight of the
    /// flanking bases that exist. Observations keep the unscaled posterior
    /// for anchoring.
    ///
    /// # Panics
    /// If `base_weights` is shorter than `read`.
    pub fn augment_weighted(
        &mut self,
        read: &[u8],
        base_weights: &[f64],
        read_no: usize,
        matches: &[AlignedPair],
        inserts: &[AlignedPair],
        deletes: &[AlignedPair],
    ) {
        assert!(base_weights.len() >= read.len(), "one weight per read base");
        let base = |y: usize| base_weights[y];
        let flank = |y: usize| {
            let flanking: Vec<f64> = [y.checked_sub(1), Some(y)]
                .into_iter()
                .flatten()
                .filter(|&k| k < read.len())
                .map(|k| base_weights[k])
                .collect();
            if flanking.is_empty() {
                1.0
            } else {
                flanking.iter().sum::<f64>() / flanking.len() as f64
            }
        };
        self.augment_with(read, read_no, matches, inserts, deletes, base, flank);
    }

    fn augment_with(
        &mut self,
        read: &[u8],
        read_no: usize,
        matches: &[AlignedPair],
        inserts: &[AlignedPair],
        deletes: &[AlignedPair],
        base_weight: impl Fn(usize) -> f64,
        gap_weight: impl Fn(usize) -> f64,
    ) {
        for pair in matches {
            let weight = pair.weight * base_weight(pair.y);
            let node = &mut self.nodes[pair.x + 1];
            node.base_weights[Symbol::from_base(read[pair.y]).index()] += weight;
            node.observations.push(PoaObservation {
                read_no,
                offset: pair.y,
                weight,
                posterior: pair.weight,
            });
        }

        let mut inserts: Vec<AlignedPair> = inserts
            .iter()
            .map(|p| AlignedPair::new(p.x, p.y, p.weight * base_weight(p.y)))
            .collect();
        inserts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
        for run in runs(&inserts, |prev, next| next.x == prev.x && next.y == prev.y + 1) {
            let x = run[0].x;
            let bases = &read[run[0].y..run[0].y + run.len()];
            let shifted = left_shift(&self.reference, x, bases);
            let insert = rotate_right(bases, x - shifted);
            self.nodes[shifted].add_insert(insert, mean_weight(run));
        }

        let mut deletes: Vec<AlignedPair> = deletes
            .iter()
            .map(|p| AlignedPair::new(p.x, p.y, p.weight * gap_weight(p.y)))
            .collect();
        deletes.sort_by(|a, b| (a.y, a.x).cmp(&(b.y, b.x)));
        for run in runs(&deletes, |prev, next| next.y == prev.y && next.x == prev.x + 1) {
            let x = run[0].x;
            let length = run.len();
            let shifted = left_shift(&self.reference, x, &self.reference[x..x + length]);
            self.nodes[shifted].add_delete(length, mean_weight(run));
        }
    }

    fn delete_coverage(&self) -> Vec<f64> {
        let n = self.reference.len();
        let mut diff = vec![0.0f64; n + 2];
        for (k, node) in self.nodes.iter().enumerate() {
            for delete in &node.deletes {
                let last = (k + delete.length).min(n);
                if k + 1 <= last {
                    diff[k + 1] += delete.weight;
                    diff[last + 1] -= delete.weight;
                }
            }
        }
        let mut covering = vec![0.0f64; n + 1];
        let mut running = 0.0;
        for i in 1..=n {
            running += diff[i];
            covering[i] = running.max(0.0);
        }
        covering
    }

    /// Extract the consensus.
    ///
    /// A node is dropped when the deletes covering it outweigh its bases.
    /// Otherwise the base maximizing `weight - reference_base_penalty` (for
    /// the reference base) or `weight` (for others) is emitted; ties go to
    /// the reference base, then to the lowest symbol. Uncovered nodes emit
    /// their reference base. After each node its heaviest insert is emitted
    /// when its weight exceeds `indel_significance_threshold` times the
    /// local coverage.
    pub fn consensus(&self, params: &PolishParams) -> Consensus {
        let n = self.reference.len();
        let covering = self.delete_coverage();

        let mut sequence = Vec::with_capacity(n);
        let mut consensus_to_reference = Vec::with_capacity(n);
        let mut reference_to_consensus = vec![None; n];

        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 && covering[i] <= node.total_base_weight() {
                reference_to_consensus[i - 1] = Some(sequence.len());
                consensus_to_reference.push(Some(i - 1));
                sequence.push(choose_base(node, params.reference_base_penalty));
            }
            if let Some(insert) = node.heaviest_insert() {
                if insert.weight > 0.0
                    && insert.weight
                        > params.indel_significance_threshold * self.local_coverage(&covering, i)
                {
                    consensus_to_reference.extend(std::iter::repeat(None).take(insert.insert.len()));
                    sequence.extend_from_slice(&insert.insert);
                }
            }
        }

        Consensus {
            sequence,
            consensus_to_reference,
            reference_to_consensus,
        }
    }

    /// Local coverage around the gap after node `index`, as used by the
    /// consensus and the greedy indel check.
    pub fn coverage_after(&self, index: usize) -> f64 {
        self.local_coverage(&self.delete_coverage(), index)
    }

    /// [`Poa::coverage_after`] for every node.
    pub fn gap_coverages(&self) -> Vec<f64> {
        let covering = self.delete_coverage();
        (0..self.nodes.len())
            .map(|i| self.local_coverage(&covering, i))
            .collect()
    }

    fn local_coverage(&self, covering: &[f64], index: usize) -> f64 {
        let n = self.reference.len();
        let flanks: Vec<f64> = [index, index + 1]
            .into_iter()
            .filter(|&k| k >= 1 && k <= n)
            .map(|k| self.nodes[k].total_base_weight() + covering[k])
            .collect();
        if flanks.is_empty() {
            0.0
        } else {
            flanks.iter().sum::<f64>() / flanks.len() as f64
        }
    }

    /// Anchor pairs for every read: observations whose posterior exceeds
    /// `min_posterior` and whose node survives into the consensus, mapped through
    /// `reference_to_consensus` (identity when `None`), then filtered to be
    /// strictly increasing in both coordinates.
    ///
    /// # Panics
    /// If an observation names a read outside `0..num_reads`, or the map is
    /// shorter than the reference.
    pub fn anchor_alignments(
        &self,
        reference_to_consensus: Option<&[Option<usize>]>,
        num_reads: usize,
        min_posterior: f64,
    ) -> Vec<Vec<AlignedPair>> {
        if let Some(map) = reference_to_consensus {
            assert_eq!(
                map.len(),
                self.reference.len(),
                "position map must cover the graph reference"
            );
        }
        let mut anchors: Vec<Vec<AlignedPair>> = vec![Vec::new(); num_reads];
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            let x = match reference_to_consensus {
                Some(map) => map[i - 1],
                None => Some(i - 1),
            };
            let Some(x) = x else {
                continue;
            };
            for observation in &node.observations {
                if observation.posterior > min_posterior {
                    assert!(
                        observation.read_no < num_reads,
                        "observation for read {} but only {num_reads} reads",
                        observation.read_no
                    );
                    anchors[observation.read_no].push(AlignedPair::new(x, observation.offset, 1.0));
                }
            }
        }

        for alignment in &mut anchors {
            alignment.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
            let mut monotone: Vec<AlignedPair> = Vec::with_capacity(alignment.len());
            for pair in alignment.drain(..) {
                if monotone
                    .last()
                    .map_or(true, |last| pair.x > last.x && pair.y > last.y)
                {
                    monotone.push(pair);
                }
            }
            *alignment = monotone;
        }
        anchors
    }

    /// Weight of read bases agreeing with the reference base.
    pub fn reference_node_total_match_weight(&self) -> f64 {
        self.nodes
            .iter()
            .skip(1)
            .map(|node| node.base_weights[Symbol::from_base(node.base).index()])
            .sum()
    }

    /// Weight of read bases disagreeing with the reference base.
    pub fn reference_node_total_disagreement_weight(&self) -> f64 {
        self.nodes
            .iter()
            .skip(1)
            .map(|node| {
                let reference = Symbol::from_base(node.base).index();
                node.total_base_weight() - node.base_weights[reference]
            })
            .sum()
    }

    /// Total weight of all inserts.
    pub fn insert_total_weight(&self) -> f64 {
        self.nodes
            .iter()
            .flat_map(|node| node.inserts.iter().map(|insert| insert.weight))
            .sum()
    }

    /// Total weight of all deletes.
    pub fn delete_total_weight(&self) -> f64 {
        self.nodes
            .iter()
            .flat_map(|node| node.deletes.iter().map(|delete| delete.weight))
            .sum()
    }

    /// Summary statistics.
    pub fn summary(&self) -> PoaSummary {
        PoaSummary {
            reference_length: self.reference.len(),
            reference_match_weight: self.reference_node_total_match_weight(),
            disagreement_weight: self.reference_node_total_disagreement_weight(),
            insert_weight: self.insert_total_weight(),
            delete_weight: self.delete_total_weight(),
            observations: self.nodes.iter().map(|node| node.observations.len()).sum(),
        }
    }

    /// Text dump of the graph: one line per node with its symbol weights,
    /// followed by inserts and deletes heavier than `indel_significance`
    /// times the local coverage.
    pub fn render(&self, indel_significance: f64) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let _ = write!(out, "{}\t{}", i, node.base as char);
            for symbol in Symbol::ALL {
                let _ = write!(
                    out,
                    "\t{}:{:.3}",
                    symbol.to_base() as char,
                    node.base_weights[symbol.index()]
                );
            }
            let threshold = indel_significance * self.coverage_after(i);
            for insert in node.inserts.iter().filter(|insert| insert.weight > threshold) {
                let _ = write!(
                    out,
                    "\tINS:{}:{:.3}",
                    String::from_utf8_lossy(&insert.insert),
                    insert.weight
                );
            }
            for delete in node.deletes.iter().filter(|delete| delete.weight > threshold) {
                let _ = write!(out, "\tDEL:{}:{:.3}", delete.length, delete.weight);
            }
            out.push('\n');
        }
        out
    }
}

fn choose_base(node: &PoaNode, reference_base_penalty: f64) -> u8 {
    if node.total_base_weight() <= 0.0 {
        return node.base;
    }
    let reference = Symbol::from_base(node.base);
    let mut best = reference;
    let mut best_score = node.base_weights[reference.index()] - reference_base_penalty;
    for symbol in Symbol::ALL {
        if symbol == reference {
            continue;
        }
        let score = node.base_weights[symbol.index()];
        if score > best_score {
            best = symbol;
            best_score = score;
        }
    }
    if best == reference {
        node.base
    } else {
        best.to_base()
    }
}

fn runs<'a>(
    pairs: &'a [AlignedPair],
    continues: impl Fn(&AlignedPair, &AlignedPair) -> bool,
) -> Vec<&'a [AlignedPair]> {
    let mut out = Vec::new();
    let mut start = 0;
    for k in 1..=pairs.len() {
        if k == pairs.len() || !continues(&pairs[k - 1], &pairs[k]) {
            out.push(&pairs[start..k]);
            start = k;
        }
    }
    out
}

fn mean_weight(run: &[AlignedPair]) -> f64 {
    run.iter().map(|pair| pair.weight).sum::<f64>() / run.len() as f64
}

fn rotate_right(bases: &[u8], steps: usize) -> Vec<u8> {
    let mut rotated = bases.to_vec();
    if !rotated.is_empty() {
        let len = rotated.len();
        rotated.rotate_right(steps % len);
    }
    rotated
}

/// Smallest reference coordinate at which `indel` can equivalently be placed.
///
/// `indel` is either inserted immediately before `reference[start]` or is the
/// deleted segment `reference[start..start + indel.len()]`. Each step left
/// requires the base before the current position to equal the last base of
/// the current rotation of `indel`; the indel at the returned position is
/// `indel` rotated right by `start - shifted`.
pub fn left_shift(reference: &[u8], start: usize, indel: &[u8]) -> usize {
    let len = indel.len();
    if len == 0 {
        return start;
    }
    let mut position = start;
    while position > 0 {
        let steps = (start - position) % len;
        let last = indel[(2 * len - 1 - steps) % len];
        if reference[position - 1] != last {
            break;
        }
        position -= 1;
    }
    position
}

/// `string` with `insert` placed before index `at`.
pub fn add_insert(string: &[u8], insert: &[u8], at: usize) -> Vec<u8> {
    let mut edited = Vec::with_capacity(string.len() + insert.len());
    edited.extend_from_slice(&string[..at]);
    edited.extend_from_slice(insert);
    edited.extend_from_slice(&string[at..]);
    edited
}

/// `string` with `length` bases removed starting at index `at`.
pub fn remove_delete(string: &[u8], length: usize, at: usize) -> Vec<u8> {
    let mut edited = Vec::with_capacity(string.len().saturating_sub(length));
    edited.extend_from_slice(&string[..at]);
    edited.extend_from_slice(&string[at + length..]);
    edited
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal(len: usize, offset: usize) -> Vec<AlignedPair> {
        (0..len).map(|k| AlignedPair::new(k + offset, k, 1.0)).collect()
    }

    #[test]
    fn reference_graph_has_prefix_node() {
        let poa = Poa::reference_graph(b"ACGT");
        assert_eq!(poa.nodes().len(), 5);
        assert_eq!(poa.node(0).base, b'N');
        assert_eq!(poa.node(3).base, b'G');
        assert!(poa.nodes().iter().all(|node| node.total_base_weight() == 0.0));
    }

    #[test]
    fn left_shift_moves_inserts_through_repeats() {
        let reference = b"GATATC";
        assert_eq!(left_shift(reference, 5, b"AT"), 1);
        assert_eq!(rotate_right(b"AT", 4), b"AT".to_vec());
        assert_eq!(left_shift(reference, 4, b"TA"), 1);
        assert_eq!(rotate_right(b"TA", 3), b"AT".to_vec());
        assert_eq!(left_shift(reference, 6, b"C"), 5);
        assert_eq!(left_shift(reference, 6, b"G"), 6);
    }

    #[test]
    fn left_shift_moves_deletes_through_homopolymers() {
        let reference = b"GAAAT";
        assert_eq!(left_shift(reference, 3, &reference[3..4]), 1);
        assert_eq!(left_shift(reference, 4, &reference[4..5]), 4);
    }

    #[test]
    fn equivalent_inserts_share_one_record() {
        let reference = b"GATATC";
        let mut poa = Poa::reference_graph(reference);
        // GAT[AT]ATC and GATAT[AT]C: same sequence, different placement.
        let read = b"GATATATC";
        let matches_a: Vec<AlignedPair> = [(0, 0), (1, 1), (2, 2), (3, 5), (4, 6), (5, 7)]
            .iter()
            .map(|&(x, y)| AlignedPair::new(x, y, 1.0))
            .collect();
        let inserts_a = vec![AlignedPair::new(3, 3, 1.0), AlignedPair::new(3, 4, 1.0)];
        poa.augment(read, 0, &matches_a, &inserts_a, &[]);

        let matches_b = diagonal(5, 0);
        let mut matches_b = matches_b;
        matches_b.push(AlignedPair::new(5, 7, 1.0));
        let inserts_b = vec![AlignedPair::new(5, 5, 1.0), AlignedPair::new(5, 6, 1.0)];
        poa.augment(read, 1, &matches_b, &inserts_b, &[]);

        assert_eq!(poa.node(1).inserts.len(), 1);
        assert_eq!(poa.node(1).inserts[0].insert, b"AT".to_vec());
        assert!((poa.node(1).inserts[0].weight - 2.0).abs() < 1e-12);
        assert_eq!(poa.insert_total_weight(), 2.0);
    }

    #[test]
    fn equivalent_deletes_share_one_record() {
        let reference = b"GAAAT";
        let mut poa = Poa::reference_graph(reference);
        let read = b"GAAT";
        poa.augment(read, 0, &[], &[], &[AlignedPair::new(3, 3, 0.5)]);
        poa.augment(read, 1, &[], &[], &[AlignedPair::new(1, 1, 0.5)]);
        assert_eq!(poa.node(1).deletes, vec![PoaDelete { length: 1, weight: 1.0 }]);
    }

    #[test]
    fn augmenting_never_lowers_weights() {
        let reference = b"ACGTACGT";
        let mut poa = Poa::reference_graph(reference);
        poa.augment(reference, 0, &diagonal(8, 0), &[], &[]);
        let before = poa.clone();
        poa.augment(b"ACGTTCGT", 1, &diagonal(8, 0), &[AlignedPair::new(2, 3, 0.5)], &[]);
        for (old, new) in before.nodes().iter().zip(poa.nodes()) {
            for k in 0..SYMBOL_COUNT {
                assert!(new.base_weights[k] >= old.base_weights[k]);
            }
            assert!(new.observations.len() >= old.observations.len());
        }
    }

    #[test]
    fn consensus_takes_majority_base() {
        let reference = b"ACGTACGTAC";
        let mut poa = Poa::reference_graph(reference);
        poa.augment(b"ACGTAGGTAC", 0, &diagonal(10, 0), &[], &[]);
        poa.augment(b"ACGTACGTAC", 1, &diagonal(10, 0), &[], &[]);
        poa.augment(b"ACGTACGTAC", 2, &diagonal(10, 0), &[], &[]);
        let consensus = poa.consensus(&PolishParams::default());
        assert_eq!(consensus.sequence, reference.to_vec());
        assert_eq!(consensus.consensus_position(5), Some(5));
    }

    #[test]
    fn consensus_applies_supported_indels() {
        let reference = b"ACGTCATG";
        let mut poa = Poa::reference_graph(reference);
        // Every read drops reference base 4 (C) and inserts CC before base 7.
        let read = b"ACGTATCCG";
        let matches: Vec<AlignedPair> = [(0, 0), (1, 1), (2, 2), (3, 3), (5, 4), (6, 5), (7, 8)]
            .iter()
            .map(|&(x, y)| AlignedPair::new(x, y, 1.0))
            .collect();
        for read_no in 0..3 {
            poa.augment(
                read,
                read_no,
                &matches,
                &[AlignedPair::new(7, 6, 1.0), AlignedPair::new(7, 7, 1.0)],
                &[AlignedPair::new(4, 4, 1.0)],
            );
        }
        let consensus = poa.consensus(&PolishParams::default());
        assert_eq!(consensus.sequence, read.to_vec());
        assert_eq!(consensus.consensus_position(3), Some(3));
        assert_eq!(consensus.consensus_position(4), None);
        assert_eq!(consensus.consensus_position(5), Some(4));
        assert_eq!(consensus.reference_position(6), None);
        assert_eq!(consensus.reference_position(8), Some(7));
    }

    #[test]
    #[should_panic(expected = "outside reference")]
    fn position_map_rejects_out_of_range_requests() {
        let poa = Poa::reference_graph(b"ACG");
        let consensus = poa.consensus(&PolishParams::default());
        consensus.consensus_position(3);
    }

    #[test]
    fn anchors_are_strictly_monotone() {
        let reference = b"ACGTACGT";
        let mut poa = Poa::reference_graph(reference);
        poa.augment(reference, 0, &diagonal(8, 0), &[], &[]);
        poa.augment(reference, 1, &[AlignedPair::new(2, 1, 0.95), AlignedPair::new(3, 1, 0.95)], &[], &[]);
        poa.augment(reference, 1, &[AlignedPair::new(5, 4, 0.5)], &[], &[]);

        let anchors = poa.anchor_alignments(None, 2, 0.9);
        assert_eq!(anchors[0].len(), 8);
        assert_eq!(anchors[1].len(), 1);
        assert_eq!((anchors[1][0].x, anchors[1][0].y), (2, 1));

        let consensus = poa.consensus(&PolishParams::default());
        let mapped = poa.anchor_alignments(Some(&consensus.reference_to_consensus), 2, 0.9);
        assert_eq!(mapped[0], anchors[0]);
    }

    #[test]
    fn read_confidence_scales_weights_but_not_anchors() {
        let reference = b"ACGTACGT";
        let mut poa = Poa::reference_graph(reference);
        // The read skips reference base 4.
        let matches: Vec<AlignedPair> = [(0, 0), (1, 1), (2, 2), (3, 3), (5, 4), (6, 5), (7, 6)]
            .into_iter()
            .map(|(x, y)| AlignedPair::new(x, y, 1.0))
            .collect();
        poa.augment_weighted(b"ACGTCGT", &[0.5; 7], 0, &matches, &[], &[AlignedPair::new(4, 4, 1.0)]);

        assert_eq!(poa.node(1).total_base_weight(), 0.5);
        assert_eq!(poa.node(1).observations[0].posterior, 1.0);
        assert_eq!(poa.delete_total_weight(), 0.5);
        assert_eq!(poa.anchor_alignments(None, 1, 0.9)[0].len(), 7);
    }

    #[test]
    fn summary_reports_undefined_rate_for_empty_graph() {
        let poa = Poa::reference_graph(b"ACGT");
        assert_eq!(poa.summary().disagreement_rate(), None);

        let mut poa = poa;
        poa.augment(b"ACTT", 0, &diagonal(4, 0), &[], &[]);
        let summary = poa.summary();
        assert_eq!(summary.reference_match_weight, 3.0);
        assert_eq!(summary.disagreement_weight, 1.0);
        assert_eq!(summary.disagreement_rate(), Some(0.25));
        assert!(poa.render(0.5).lines().count() == 5);
    }

    #[test]
    fn edit_helpers_splice_strings() {
        assert_eq!(add_insert(b"ACGT", b"TT", 2), b"ACTTGT".to_vec());
        assert_eq!(remove_delete(b"ACGTAC", 2, 1), b"ATAC".to_vec());
    }
}
