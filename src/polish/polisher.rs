//! End-to-end polishing of a region and of a whole chunked alignment source.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::framework::{CancellationToken, ChunkContext, ChunkProcessor, FrameworkError};
use crate::genomics::{AlignmentSource, Read, ReferenceSource};
use crate::params::{ParamsError, PolishParams};
use crate::polish::chunker::{load_chunk_reads, BamChunk, BamChunker};
use crate::polish::pairwise::AlignedPair;
use crate::polish::poa::{Poa, PoaSummary};
use crate::polish::realign::{
    check_major_indel_edits_greedily_with_edits, compose_maps, realign, realign_iterative,
};
use crate::polish::repeat_model::{expand_rle_consensus, RepeatSubMatrix};
use crate::polish::rle::{run_length_encode_alignment, RleString};

/// Polished sequence of one region with its coordinate maps.
#[derive(Debug, Clone)]
pub struct PolishedRegion {
    /// Consensus bases (expanded when run-length encoding was used).
    pub consensus: Vec<u8>,
    /// For each consensus position, the reference position it derives from.
    pub consensus_to_reference: Vec<Option<usize>>,
    /// For each reference position, its consensus position.
    pub reference_to_consensus: Vec<Option<usize>>,
    /// Run-length consensus before expansion, when run-length encoding was used.
    pub rle_consensus: Option<Vec<u8>>,
    /// Graphs built by the realignment loop.
    pub iterations: usize,
    /// Whether the realignment loop converged.
    pub converged: bool,
    /// Edits accepted by the greedy indel check.
    pub greedy_edits: usize,
    /// Statistics of the final graph.
    pub summary: PoaSummary,
}

fn invert(map: &[Option<usize>], len: usize) -> Vec<Option<usize>> {
    let mut inverse = vec![None; len];
    for (from, to) in map.iter().enumerate() {
        if let Some(to) = *to {
            if inverse[to].is_none() {
                inverse[to] = Some(from);
            }
        }
    }
    inverse
}

/// Graph-based polisher for a single region.
///
/// Parameters and the repeat model are shared read-only, so one polisher can
/// serve every chunk worker.
#[derive(Debug, Clone)]
pub struct RegionPolisher {
    params: Arc<PolishParams>,
    repeat_model: Arc<RepeatSubMatrix>,
}

impl RegionPolisher {
    /// Validate `params` and build the repeat model they describe.
    pub fn new(params: PolishParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let repeat_model = RepeatSubMatrix::from_params(&params.repeat_model)?;
        Ok(Self::with_shared(Arc::new(params), Arc::new(repeat_model)))
    }

    /// Polisher over already-built shared state.
    pub fn with_shared(params: Arc<PolishParams>, repeat_model: Arc<RepeatSubMatrix>) -> Self {
        Self {
            params,
            repeat_model,
        }
    }

    /// Run parameters.
    pub fn params(&self) -> &PolishParams {
        &self.params
    }

    /// Repeat-count model.
    pub fn repeat_model(&self) -> &RepeatSubMatrix {
        &self.repeat_model
    }

    /// Polish `reference` with `reads`.
    ///
    /// `alignments[k]` holds read `k`'s aligned pairs to `reference`, strictly
    /// increasing in both coordinates; an empty list aligns the read globally.
    ///
    /// # Panics
    /// If `alignments` does not have one entry per read.
    pub fn polish(
        &self,
        reference: &[u8],
        reads: &[Read],
        alignments: &[Vec<AlignedPair>],
        cancel: &CancellationToken,
    ) -> PolishedRegion {
        assert_eq!(reads.len(), alignments.len(), "one alignment per read");
        if self.params.use_run_length_encoding {
            self.polish_run_length(reference, reads, alignments, cancel)
        } else {
            self.polish_bases(reference, reads, alignments, cancel)
        }
    }

    /// Iterative realignment plus the optional greedy check. Returns a graph
    /// whose reference is the final consensus and the map into it.
    fn refine(
        &self,
        reference: &[u8],
        reads: &[Read],
        alignments: &[Vec<AlignedPair>],
        cancel: &CancellationToken,
    ) -> (Poa, Vec<Option<usize>>, usize, bool, usize) {
        let params = &*self.params;
        let result = realign_iterative(reads, alignments, reference, params, cancel);
        let (mut poa, mut map) = (result.poa, result.reference_map);

        let mut greedy_edits = 0;
        if params.greedy_indel_edits && !cancel.is_cancelled() {
            let (edited, edits) = check_major_indel_edits_greedily_with_edits(poa, reads, params);
            for edit in &edits {
                map = map
                    .iter()
                    .map(|position| position.and_then(|p| edit.map_position(p)))
                    .collect();
            }
            greedy_edits = edits.len();
            poa = edited;
        }

        let consensus = poa.consensus(params);
        if consensus.sequence != poa.reference() {
            let anchors = poa.anchor_alignments(
                Some(&consensus.reference_to_consensus),
                reads.len(),
                params.min_posterior_prob_for_alignment_anchor,
            );
            map = compose_maps(&map, &consensus.reference_to_consensus);
            poa = realign(reads, &anchors, &consensus.sequence, params);
        }
        (poa, map, result.iterations, result.converged, greedy_edits)
    }

    fn polish_bases(
        &self,
        reference: &[u8],
        reads: &[Read],
        alignments: &[Vec<AlignedPair>],
        cancel: &CancellationToken,
    ) -> PolishedRegion {
        let (poa, map, iterations, converged, greedy_edits) = self.refine(reference, reads, alignments, cancel);
        let consensus = poa.reference().to_vec();
        PolishedRegion {
            consensus_to_reference: invert(&map, consensus.len()),
            reference_to_consensus: map,
            consensus,
            rle_consensus: None,
            iterations,
            converged,
            greedy_edits,
            summary: poa.summary(),
        }
    }

    fn polish_run_length(
        &self,
        reference: &[u8],
        reads: &[Read],
        alignments: &[Vec<AlignedPair>],
        cancel: &CancellationToken,
    ) -> PolishedRegion {
        let rle_reference = RleString::encode(reference);
        let (rle_strings, rle_reads): (Vec<RleString>, Vec<Read>) =
            reads.iter().map(RleString::encode_read).unzip();
        let rle_alignments: Vec<Vec<AlignedPair>> = alignments
            .iter()
            .zip(&rle_strings)
            .map(|(alignment, rle_read)| run_length_encode_alignment(alignment, &rle_reference, rle_read))
            .collect();

        let (poa, rle_map, iterations, converged, greedy_edits) =
            self.refine(rle_reference.as_bytes(), &rle_reads, &rle_alignments, cancel);
        let expanded = expand_rle_consensus(&poa, &rle_strings, &self.repeat_model);
        let consensus = expanded.expand();

        let reference_to_consensus: Vec<Option<usize>> = (0..reference.len())
            .map(|position| {
                let run = rle_reference.rle_position(position);
                let offset = position - rle_reference.non_rle_position(run);
                let target = rle_map[run]?;
                let count = expanded.repeat_count(target);
                (count > 0).then(|| expanded.non_rle_position(target) + offset.min(count - 1))
            })
            .collect();

        debug!(
            rle_length = expanded.len(),
            expanded_length = consensus.len(),
            "expanded run-length consensus"
        );
        PolishedRegion {
            consensus_to_reference: invert(&reference_to_consensus, consensus.len()),
            reference_to_consensus,
            rle_consensus: Some(expanded.as_bytes().to_vec()),
            consensus,
            iterations,
            converged,
            greedy_edits,
            summary: poa.summary(),
        }
    }
}

/// Slice of `consensus` covering the reference window `window`, using the
/// region's reference map. A bound maps to the first consensus position of
/// a surviving reference position at or after it; bounds at the region edges
/// map to the consensus edges.
pub fn cut_window(region: &PolishedRegion, window: Range<usize>) -> &[u8] {
    let map = &region.reference_to_consensus;
    let locate = |bound: usize| -> usize {
        if bound == 0 {
            return 0;
        }
        map.iter()
            .skip(bound)
            .find_map(|position| *position)
            .unwrap_or(region.consensus.len())
    };
    let start = locate(window.start);
    let end = locate(window.end).max(start);
    &region.consensus[start..end]
}

/// How a chunk's sequence was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The graph ran on the chunk's reads.
    Polished,
    /// No usable reads; the reference window was copied through.
    Copied,
    /// The reference window could not be read; the chunk has no sequence.
    Skipped,
}

/// Consensus for one chunk's tight window.
#[derive(Debug, Clone)]
pub struct ChunkConsensus {
    /// The chunk.
    pub chunk: BamChunk,
    /// Consensus bases for the tight window.
    pub sequence: Vec<u8>,
    /// Reads loaded for the chunk.
    pub reads: usize,
    /// Loaded reads starting in the tight window, so each read is counted
    /// by exactly one chunk.
    pub owned_reads: usize,
    /// How the sequence was produced.
    pub status: ChunkStatus,
    /// Realignment iterations.
    pub iterations: usize,
}

/// Polished sequence of a whole contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigConsensus {
    /// Contig name.
    pub contig: Arc<str>,
    /// Stitched consensus.
    pub sequence: Vec<u8>,
    /// Chunks that contributed.
    pub chunks: usize,
    /// Chunks whose reads went through the graph.
    pub polished_chunks: usize,
    /// Reads attributed to the contig, each counted once.
    pub reads: usize,
}

/// [`ChunkProcessor`] polishing every chunk of a [`BamChunker`].
///
/// Unreadable inputs never fail the run: a chunk whose reads cannot be
/// loaded keeps the reference, and a contig with any chunk whose reference
/// cannot be read is left out of the output so the caller can keep its
/// draft.
#[derive(Debug)]
pub struct ChunkedPolisher<A, R> {
    polisher: RegionPolisher,
    alignments: A,
    reference: R,
}

impl<A: AlignmentSource, R: ReferenceSource> ChunkedPolisher<A, R> {
    /// Polish reads from `alignments` against `reference`.
    pub fn new(polisher: RegionPolisher, alignments: A, reference: R) -> Self {
        Self {
            polisher,
            alignments,
            reference,
        }
    }

    /// The region polisher.
    pub fn polisher(&self) -> &RegionPolisher {
        &self.polisher
    }

    fn reference_window(&self, chunk: &BamChunk, window: Range<usize>) -> Option<Vec<u8>> {
        match self.reference.fetch(&chunk.contig, window.start, window.end) {
            Ok(bases) => Some(bases),
            Err(err) => {
                warn!(
                    chunk = chunk.index,
                    contig = %chunk.contig,
                    error = %err,
                    "reference unavailable, skipping chunk"
                );
                None
            }
        }
    }
}

impl<A: AlignmentSource, R: ReferenceSource> ChunkProcessor for ChunkedPolisher<A, R> {
    type Input = BamChunker;
    type ChunkSummary = ChunkConsensus;
    type Output = Vec<ContigConsensus>;

    fn num_chunks(&self, input: &Self::Input) -> usize {
        input.len()
    }

    fn chunk_range(&self, input: &Self::Input, chunk_id: usize) -> Result<Range<usize>, FrameworkError> {
        input
            .get(chunk_id)
            .map(|chunk| chunk.start..chunk.end)
            .ok_or(FrameworkError::ChunkOutOfRange {
                chunk_id,
                num_chunks: input.len(),
            })
    }

    fn process_chunk(
        &self,
        input: &Self::Input,
        context: &ChunkContext,
    ) -> Result<Self::ChunkSummary, FrameworkError> {
        let chunk = input.get(context.chunk_id).ok_or(FrameworkError::ChunkOutOfRange {
            chunk_id: context.chunk_id,
            num_chunks: input.len(),
        })?;
        let summary = |sequence: Option<Vec<u8>>, reads: usize, owned_reads: usize, status: ChunkStatus| {
            let (sequence, status) = match sequence {
                Some(sequence) => (sequence, status),
                None => (Vec::new(), ChunkStatus::Skipped),
            };
            ChunkConsensus {
                chunk: chunk.clone(),
                sequence,
                reads,
                owned_reads,
                status,
                iterations: 0,
            }
        };

        let loaded = match load_chunk_reads(&self.alignments, chunk, input.include_soft_clip()) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(
                    contig = %chunk.contig,
                    start = chunk.start,
                    end = chunk.end,
                    error = %err,
                    "failed to load chunk reads, keeping the reference"
                );
                let tight = self.reference_window(chunk, chunk.start..chunk.end);
                return Ok(summary(tight, 0, 0, ChunkStatus::Copied));
            }
        };
        let owned_reads = loaded.owned();
        if loaded.is_empty() {
            let tight = self.reference_window(chunk, chunk.start..chunk.end);
            return Ok(summary(tight, 0, 0, ChunkStatus::Copied));
        }

        let Some(reference) = self.reference_window(chunk, chunk.boundary_start..chunk.boundary_end) else {
            return Ok(summary(None, loaded.len(), owned_reads, ChunkStatus::Skipped));
        };
        let region = self
            .polisher
            .polish(&reference, &loaded.reads, &loaded.alignments, &context.cancel);
        let tight = chunk.start - chunk.boundary_start..chunk.end - chunk.boundary_start;
        let sequence = cut_window(&region, tight).to_vec();
        debug!(
            chunk = chunk.index,
            contig = %chunk.contig,
            reads = loaded.len(),
            owned_reads,
            iterations = region.iterations,
            converged = region.converged,
            length = sequence.len(),
            "polished chunk"
        );
        Ok(ChunkConsensus {
            iterations: region.iterations,
            ..summary(Some(sequence), loaded.len(), owned_reads, ChunkStatus::Polished)
        })
    }

    fn finalize(
        &self,
        summaries: Vec<Self::ChunkSummary>,
        _input: &Self::Input,
    ) -> Result<Self::Output, FrameworkError> {
        let mut contigs: Vec<(ContigConsensus, bool)> = Vec::new();
        for summary in summaries {
            let skipped = summary.status == ChunkStatus::Skipped;
            let polished = usize::from(summary.status == ChunkStatus::Polished);
            match contigs.last_mut() {
                Some((last, incomplete)) if last.contig == summary.chunk.contig => {
                    last.sequence.extend_from_slice(&summary.sequence);
                    last.chunks += 1;
                    last.polished_chunks += polished;
                    last.reads += summary.owned_reads;
                    *incomplete |= skipped;
                }
                _ => contigs.push((
                    ContigConsensus {
                        contig: Arc::clone(&summary.chunk.contig),
                        sequence: summary.sequence,
                        chunks: 1,
                        polished_chunks: polished,
                        reads: summary.owned_reads,
                    },
                    skipped,
                )),
            }
        }
        Ok(contigs
            .into_iter()
            .filter_map(|(contig, incomplete)| {
                if incomplete {
                    warn!(contig = %contig.contig, "contig has unreadable reference windows, leaving it out");
                    None
                } else {
                    Some(contig)
                }
            })
            .collect())
    }
}
