//! Graph construction from reads and the consensus/realignment loop.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::framework::CancellationToken;
use crate::genomics::Read;
use crate::params::PolishParams;
use crate::polish::pairwise::{self, AlignedPair};
use crate::polish::poa::{add_insert, remove_delete, Poa};

/// Outcome of [`realign_iterative`].
#[derive(Debug, Clone)]
pub struct IterativeRealignment {
    /// Graph built against the last consensus.
    pub poa: Poa,
    /// Number of graphs built (at least 1).
    pub iterations: usize,
    /// Whether the consensus stopped changing before the cap.
    pub converged: bool,
    /// For each position of the input reference, its position in
    /// `poa.reference()` (`None` once deleted).
    pub reference_map: Vec<Option<usize>>,
}

/// Edit applied to a reference by the greedy indel check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceEdit {
    /// `bases` inserted before reference position `at`.
    Insert {
        /// Insertion point.
        at: usize,
        /// Inserted bases.
        bases: Vec<u8>,
    },
    /// `length` bases removed starting at reference position `at`.
    Delete {
        /// First deleted position.
        at: usize,
        /// Number of deleted bases.
        length: usize,
    },
}

impl ReferenceEdit {
    /// Apply the edit.
    pub fn apply(&self, reference: &[u8]) -> Vec<u8> {
        match self {
            ReferenceEdit::Insert { at, bases } => add_insert(reference, bases, *at),
            ReferenceEdit::Delete { at, length } => remove_delete(reference, *length, *at),
        }
    }

    /// Where a position of the unedited reference lands after the edit.
    pub fn map_position(&self, position: usize) -> Option<usize> {
        match self {
            ReferenceEdit::Insert { at, bases } if position >= *at => Some(position + bases.len()),
            ReferenceEdit::Insert { .. } => Some(position),
            ReferenceEdit::Delete { at, length } => {
                if position < *at {
                    Some(position)
                } else if position < at + length {
                    None
                } else {
                    Some(position - length)
                }
            }
        }
    }

    fn position(&self) -> usize {
        match self {
            ReferenceEdit::Insert { at, .. } | ReferenceEdit::Delete { at, .. } => *at,
        }
    }
}

/// Compose two position maps: `first` into an intermediate reference, then
/// `second` into the final one.
pub fn compose_maps(first: &[Option<usize>], second: &[Option<usize>]) -> Vec<Option<usize>> {
    first
        .iter()
        .map(|position| position.and_then(|p| second[p]))
        .collect()
}

fn anchors_for(read_anchors: &[AlignedPair]) -> Option<&[AlignedPair]> {
    if read_anchors.is_empty() {
        None
    } else {
        Some(read_anchors)
    }
}

/// Build a graph for `reference` from every read.
///
/// Each read is aligned with the pair HMM, banded around its anchors when it
/// has any; every posterior is scaled by the weight of the read bases
/// involved, while anchors are later taken from the raw posteriors.
///
/// # Panics
/// If `anchors` does not have one entry per read.
pub fn realign(reads: &[Read], anchors: &[Vec<AlignedPair>], reference: &[u8], params: &PolishParams) -> Poa {
    assert_eq!(reads.len(), anchors.len(), "one anchor list per read");
    let mut poa = Poa::reference_graph(reference);
    for (read_no, (read, read_anchors)) in reads.iter().zip(anchors).enumerate() {
        let posteriors = pairwise::posteriors(
            reference,
            &read.bases,
            anchors_for(read_anchors),
            &params.alignment,
        );
        trace!(
            read = %read.name,
            matches = posteriors.matches.len(),
            inserts = posteriors.inserts.len(),
            deletes = posteriors.deletes.len(),
            "augmenting graph"
        );
        poa.augment_weighted(
            &read.bases,
            &read.weights,
            read_no,
            &posteriors.matches,
            &posteriors.inserts,
            &posteriors.deletes,
        );
    }
    poa
}

/// Alternate consensus extraction and realignment until the consensus
/// equals the graph reference, `max_realignment_iterations` graphs have been
/// built, or `cancel` is set. Non-convergence is not an error.
pub fn realign_iterative(
    reads: &[Read],
    anchors: &[Vec<AlignedPair>],
    reference: &[u8],
    params: &PolishParams,
    cancel: &CancellationToken,
) -> IterativeRealignment {
    let mut poa = realign(reads, anchors, reference, params);
    let mut reference_map: Vec<Option<usize>> = (0..reference.len()).map(Some).collect();
    let mut iterations = 1;
    let mut converged = false;

    loop {
        let consensus = poa.consensus(params);
        if consensus.sequence == poa.reference() {
            converged = true;
            break;
        }
        if iterations >= params.max_realignment_iterations || cancel.is_cancelled() {
            break;
        }
        debug!(
            iteration = iterations,
            reference_length = poa.reference().len(),
            consensus_length = consensus.sequence.len(),
            "consensus changed, realigning"
        );
        let anchors = poa.anchor_alignments(
            Some(&consensus.reference_to_consensus),
            reads.len(),
            params.min_posterior_prob_for_alignment_anchor,
        );
        reference_map = compose_maps(&reference_map, &consensus.reference_to_consensus);
        poa = realign(reads, &anchors, &consensus.sequence, params);
        iterations += 1;
    }

    debug!(iterations, converged, "iterative realignment finished");
    IterativeRealignment {
        poa,
        iterations,
        converged,
        reference_map,
    }
}

fn total_log_likelihood(
    reference: &[u8],
    reads: &[Read],
    anchors: &[Vec<AlignedPair>],
    params: &PolishParams,
) -> f64 {
    reads
        .iter()
        .zip(anchors)
        .map(|(read, read_anchors)| {
            pairwise::log_likelihood(reference, &read.bases, anchors_for(read_anchors), &params.alignment)
        })
        .sum()
}

fn map_anchors(anchors: &[Vec<AlignedPair>], edit: &ReferenceEdit) -> Vec<Vec<AlignedPair>> {
    anchors
        .iter()
        .map(|read_anchors| {
            read_anchors
                .iter()
                .filter_map(|pair| {
                    edit.map_position(pair.x)
                        .map(|x| AlignedPair::new(x, pair.y, pair.weight))
                })
                .collect()
        })
        .collect()
}

fn candidate_edits(poa: &Poa, params: &PolishParams) -> Vec<(f64, ReferenceEdit)> {
    let reference_length = poa.reference().len();
    let coverages = poa.gap_coverages();
    let mut candidates = Vec::new();
    for (k, node) in poa.nodes().iter().enumerate() {
        let floor = params.greedy_candidate_fraction * coverages[k];
        for insert in &node.inserts {
            if insert.weight > 0.0 && insert.weight >= floor {
                candidates.push((
                    insert.weight,
                    ReferenceEdit::Insert {
                        at: k,
                        bases: insert.insert.clone(),
                    },
                ));
            }
        }
        for delete in &node.deletes {
            if delete.weight > 0.0 && delete.weight >= floor && k + delete.length <= reference_length {
                candidates.push((
                    delete.weight,
                    ReferenceEdit::Delete {
                        at: k,
                        length: delete.length,
                    },
                ));
            }
        }
    }
    candidates.sort_by(|a, b| match b.0.total_cmp(&a.0) {
        Ordering::Equal => a.1.position().cmp(&b.1.position()),
        other => other,
    });
    candidates
}

/// Greedy indel check returning the accepted edits alongside the graph.
///
/// Edits are listed in the order they were applied; each is expressed in the
/// coordinates of the reference produced by the previous one.
pub fn check_major_indel_edits_greedily_with_edits(
    poa: Poa,
    reads: &[Read],
    params: &PolishParams,
) -> (Poa, Vec<ReferenceEdit>) {
    let mut poa = poa;
    let mut edits = Vec::new();
    while edits.len() < params.max_greedy_edits {
        let anchors = poa.anchor_alignments(None, reads.len(), params.min_posterior_prob_for_alignment_anchor);
        let baseline = total_log_likelihood(poa.reference(), reads, &anchors, params);

        let mut accepted = None;
        for (weight, edit) in candidate_edits(&poa, params) {
            let edited = edit.apply(poa.reference());
            let edited_anchors = map_anchors(&anchors, &edit);
            let score = total_log_likelihood(&edited, reads, &edited_anchors, params);
            trace!(?edit, weight, score, baseline, "scored greedy edit");
            if score > baseline {
                accepted = Some((edit, edited, edited_anchors));
                break;
            }
        }

        let Some((edit, edited, edited_anchors)) = accepted else {
            break;
        };
        debug!(?edit, "accepted greedy indel edit");
        poa = realign(reads, &edited_anchors, &edited, params);
        edits.push(edit);
    }
    (poa, edits)
}

/// Try the heavier indels the consensus left out, one at a time, keeping any
/// that raise the summed read log-likelihood. At most `max_greedy_edits`
/// edits are accepted; the graph is rebuilt after each.
pub fn check_major_indel_edits_greedily(poa: Poa, reads: &[Read], params: &PolishParams) -> Poa {
    check_major_indel_edits_greedily_with_edits(poa, reads, params).0
}

/// Maximal-expected-accuracy alignment of every read to the graph reference,
/// anchored on the graph's confident observations.
pub fn read_alignments_to_consensus(poa: &Poa, reads: &[Read], params: &PolishParams) -> Vec<Vec<AlignedPair>> {
    let anchors = poa.anchor_alignments(None, reads.len(), params.min_posterior_prob_for_alignment_anchor);
    reads
        .iter()
        .zip(&anchors)
        .map(|(read, read_anchors)| {
            pairwise::mea_alignment(poa.reference(), &read.bases, anchors_for(read_anchors), &params.alignment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUTH: &[u8] = b"ATGCGTACCTGATCGGATCCAGTTCAGGCATTACGGTCAA";

    fn reads_of(sequences: &[&[u8]]) -> Vec<Read> {
        sequences
            .iter()
            .enumerate()
            .map(|(k, s)| Read::new(format!("read{k}"), s.to_vec()))
            .collect()
    }

    fn no_anchors(n: usize) -> Vec<Vec<AlignedPair>> {
        vec![Vec::new(); n]
    }

    #[test]
    fn correct_reference_converges_immediately() {
        let reads = reads_of(&[TRUTH; 4]);
        let params = PolishParams::default();
        let result = realign_iterative(&reads, &no_anchors(4), TRUTH, &params, &CancellationToken::new());
        assert!(result.converged);
        assert!(result.iterations <= 2);
        assert_eq!(result.poa.reference(), TRUTH);
        assert_eq!(result.reference_map[7], Some(7));
    }

    #[test]
    fn substitution_is_corrected() {
        let mut reference = TRUTH.to_vec();
        reference[20] = b'T';
        let reads = reads_of(&[TRUTH; 5]);
        let params = PolishParams::default();
        let result = realign_iterative(&reads, &no_anchors(5), &reference, &params, &CancellationToken::new());
        assert!(result.converged);
        assert_eq!(result.poa.reference(), TRUTH);
        assert_eq!(result.reference_map[20], Some(20));
    }

    #[test]
    fn missing_base_is_inserted() {
        // Drop the A of "GCAT" (index 29).
        let reference = remove_delete(TRUTH, 1, 29);
        let reads = reads_of(&[TRUTH; 5]);
        let params = PolishParams::default();
        let result = realign_iterative(&reads, &no_anchors(5), &reference, &params, &CancellationToken::new());
        assert!(result.converged);
        assert_eq!(result.poa.reference(), TRUTH);
        assert_eq!(result.reference_map[28], Some(28));
        assert_eq!(result.reference_map[29], Some(30));
    }

    #[test]
    fn extra_base_is_deleted() {
        let reference = add_insert(TRUTH, b"G", 12);
        let reads = reads_of(&[TRUTH; 5]);
        let params = PolishParams::default();
        let result = realign_iterative(&reads, &no_anchors(5), &reference, &params, &CancellationToken::new());
        assert!(result.converged);
        assert_eq!(result.poa.reference(), TRUTH);
        assert_eq!(result.reference_map.len(), reference.len());
        assert_eq!(result.reference_map.iter().filter(|p| p.is_none()).count(), 1);
    }

    #[test]
    fn low_quality_majority_outweighs_minority_delete() {
        let missing = remove_delete(TRUTH, 1, 20);
        let q3 = |k: usize, bases: &[u8]| Read::with_qualities(format!("read{k}"), bases.to_vec(), &vec![3; bases.len()]);
        let reads = vec![q3(0, TRUTH), q3(1, &missing), q3(2, TRUTH), q3(3, &missing), q3(4, TRUTH)];
        let params = PolishParams::default();
        let result = realign_iterative(&reads, &no_anchors(5), TRUTH, &params, &CancellationToken::new());
        assert_eq!(result.poa.reference(), TRUTH);
        assert!(result.poa.delete_total_weight() < result.poa.node(21).total_base_weight());

        let anchors = result
            .poa
            .anchor_alignments(None, reads.len(), params.min_posterior_prob_for_alignment_anchor);
        assert!(anchors.iter().all(|read_anchors| !read_anchors.is_empty()));
    }

    #[test]
    fn cancellation_stops_after_first_graph() {
        let mut reference = TRUTH.to_vec();
        reference[20] = b'T';
        let reads = reads_of(&[TRUTH; 5]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = realign_iterative(&reads, &no_anchors(5), &reference, &PolishParams::default(), &cancel);
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
        assert_eq!(result.poa.reference(), reference.as_slice());
    }

    #[test]
    fn iteration_cap_is_respected() {
        let mut reference = TRUTH.to_vec();
        reference[20] = b'T';
        let reads = reads_of(&[TRUTH; 5]);
        let params = PolishParams::default().with_max_realignment_iterations(1);
        let result = realign_iterative(&reads, &no_anchors(5), &reference, &params, &CancellationToken::new());
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
    }

    #[test]
    fn greedy_check_accepts_likelihood_gains() {
        // Three of five reads carry the A between C and T at index 29.
        let reference = remove_delete(TRUTH, 1, 29);
        let reads = reads_of(&[TRUTH, TRUTH, TRUTH, reference.as_slice(), reference.as_slice()]);
        let mut params = PolishParams::default();
        params.indel_significance_threshold = 0.9;

        let poa = realign(&reads, &no_anchors(5), &reference, &params);
        assert_eq!(poa.consensus(&params).sequence, reference);

        let (poa, edits) = check_major_indel_edits_greedily_with_edits(poa, &reads, &params);
        assert_eq!(poa.reference(), TRUTH);
        assert_eq!(edits.len(), 1);
        assert!(matches!(&edits[0], ReferenceEdit::Insert { bases, .. } if bases == b"A"));
    }

    #[test]
    fn greedy_check_rejects_minority_indels() {
        let reference = remove_delete(TRUTH, 1, 29);
        let reads = reads_of(&[TRUTH, TRUTH, reference.as_slice(), reference.as_slice(), reference.as_slice()]);
        let params = PolishParams::default();
        let poa = realign(&reads, &no_anchors(5), &reference, &params);
        let poa = check_major_indel_edits_greedily(poa, &reads, &params);
        assert_eq!(poa.reference(), reference.as_slice());
    }

    #[test]
    fn edits_map_positions() {
        let insert = ReferenceEdit::Insert {
            at: 3,
            bases: b"GG".to_vec(),
        };
        assert_eq!(insert.apply(b"ACGTA"), b"ACGGGTA".to_vec());
        assert_eq!(insert.map_position(2), Some(2));
        assert_eq!(insert.map_position(3), Some(5));

        let delete = ReferenceEdit::Delete { at: 1, length: 2 };
        assert_eq!(delete.apply(b"ACGTA"), b"ATA".to_vec());
        assert_eq!(delete.map_position(0), Some(0));
        assert_eq!(delete.map_position(2), None);
        assert_eq!(delete.map_position(3), Some(1));

        assert_eq!(
            compose_maps(&[Some(0), Some(1), None], &[Some(1), None]),
            vec![Some(1), None, None]
        );
    }

    #[test]
    fn reads_align_to_consensus() {
        let reads = reads_of(&[TRUTH; 3]);
        let params = PolishParams::default();
        let poa = realign(&reads, &no_anchors(3), TRUTH, &params);
        let alignments = read_alignments_to_consensus(&poa, &reads, &params);
        assert_eq!(alignments.len(), 3);
        for alignment in alignments {
            assert_eq!(alignment.len(), TRUTH.len());
            assert!(alignment.iter().all(|pair| pair.x == pair.y));
        }
    }
}
