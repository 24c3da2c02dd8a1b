//! Partitioning of an alignment source into overlapping windows.
//!
//! Each contig with alignments is tiled by tight windows of `chunk_size`
//! bases; each tight window is widened by `chunk_boundary` on both sides
//! (clipped to the contig) to seed the graph near its edges. Only the tight
//! window's consensus is kept.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::genomics::{AlignedRead, AlignmentSource, ContigInfo, Read, SourceError};
use crate::params::PolishParams;
use crate::polish::pairwise::AlignedPair;

/// Errors raised while building chunks.
#[derive(Debug, Error)]
pub enum ChunkerError {
    /// Chunks must cover at least one base.
    #[error("chunk size must be > 0")]
    ZeroChunkSize,

    /// The alignment source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// One window of a contig.
///
/// `boundary_start <= start <= end <= boundary_end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BamChunk {
    /// Position of the chunk in the chunker.
    pub index: usize,
    /// Contig name.
    pub contig: Arc<str>,
    /// Contig length.
    pub contig_length: usize,
    /// Start of the widened window.
    pub boundary_start: usize,
    /// Start of the tight window.
    pub start: usize,
    /// End of the tight window (exclusive).
    pub end: usize,
    /// End of the widened window (exclusive).
    pub boundary_end: usize,
}

impl BamChunk {
    /// Length of the tight window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the tight window is empty.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Length of the widened window.
    pub fn boundary_len(&self) -> usize {
        self.boundary_end - self.boundary_start
    }

    /// Whether `position` lies in the tight window.
    pub fn owns(&self, position: usize) -> bool {
        (self.start..self.end).contains(&position)
    }
}

impl fmt::Display for BamChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.contig, self.boundary_start, self.start, self.end, self.boundary_end
        )
    }
}

/// Chunks of an alignment source, consumed through [`Iterator`].
#[derive(Debug, Clone)]
pub struct BamChunker {
    chunks: Vec<BamChunk>,
    cursor: usize,
    chunk_size: usize,
    chunk_boundary: usize,
    include_soft_clip: bool,
}

impl BamChunker {
    /// Scan `source` once and tile every contig that has a usable alignment.
    ///
    /// Fails when `chunk_size` is zero, when records are not
    /// coordinate-sorted, or when a record names a contig missing from the
    /// header.
    pub fn construct(
        source: &dyn AlignmentSource,
        chunk_size: usize,
        chunk_boundary: usize,
        include_soft_clip: bool,
    ) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        let contigs = source.contigs()?;
        let order: HashMap<&str, usize> = contigs
            .iter()
            .enumerate()
            .map(|(i, contig)| (&*contig.name, i))
            .collect();

        let mut seen = HashSet::new();
        let mut previous: Option<(usize, usize)> = None;
        let mut failure: Option<SourceError> = None;
        let mut records = 0usize;
        source.scan(&mut |read: &AlignedRead| {
            if failure.is_some() {
                return;
            }
            let Some(&tid) = order.get(&*read.chrom) else {
                failure = Some(SourceError::UnknownContig(read.chrom.to_string()));
                return;
            };
            if let Some((prev_tid, prev_pos)) = previous {
                if (tid, read.pos) < (prev_tid, prev_pos) {
                    failure = Some(SourceError::Unsorted {
                        contig: read.chrom.to_string(),
                        pos: read.pos,
                        previous_contig: contigs[prev_tid].name.to_string(),
                        previous_pos: prev_pos,
                    });
                    return;
                }
            }
            previous = Some((tid, read.pos));
            seen.insert(tid);
            records += 1;
        })?;
        if let Some(err) = failure {
            return Err(err.into());
        }

        let used: Vec<ContigInfo> = contigs
            .iter()
            .enumerate()
            .filter(|(tid, _)| seen.contains(tid))
            .map(|(_, contig)| contig.clone())
            .collect();
        let chunker = Self::tile(&used, chunk_size, chunk_boundary, include_soft_clip)?;
        info!(
            records,
            contigs = used.len(),
            chunks = chunker.len(),
            chunk_size,
            chunk_boundary,
            "built chunks"
        );
        Ok(chunker)
    }

    /// [`BamChunker::construct`] with sizes taken from `params`.
    pub fn from_params(source: &dyn AlignmentSource, params: &PolishParams) -> Result<Self, ChunkerError> {
        Self::construct(source, params.chunk_size, params.chunk_boundary, params.include_soft_clip)
    }

    /// Tile `contigs` without consulting any alignments.
    pub fn tile(
        contigs: &[ContigInfo],
        chunk_size: usize,
        chunk_boundary: usize,
        include_soft_clip: bool,
    ) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        let mut chunks = Vec::new();
        for contig in contigs {
            let mut start = 0;
            while start < contig.length {
                let end = (start + chunk_size).min(contig.length);
                chunks.push(BamChunk {
                    index: chunks.len(),
                    contig: Arc::clone(&contig.name),
                    contig_length: contig.length,
                    boundary_start: start.saturating_sub(chunk_boundary),
                    start,
                    end,
                    boundary_end: (end + chunk_boundary).min(contig.length),
                });
                start = end;
            }
        }
        Ok(Self {
            chunks,
            cursor: 0,
            chunk_size,
            chunk_boundary,
            include_soft_clip,
        })
    }

    /// All chunks in order.
    pub fn chunks(&self) -> &[BamChunk] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether there are no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk by index.
    pub fn get(&self, index: usize) -> Option<&BamChunk> {
        self.chunks.get(index)
    }

    /// Tight window size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Boundary size.
    pub fn chunk_boundary(&self) -> usize {
        self.chunk_boundary
    }

    /// Whether soft clips count toward read extents.
    pub fn include_soft_clip(&self) -> bool {
        self.include_soft_clip
    }
}

impl Iterator for BamChunker {
    type Item = BamChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunks.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BamChunker {}

/// Reads of one chunk, ready for graph construction.
#[derive(Debug, Clone, Default)]
pub struct ChunkReads {
    /// Trimmed reads.
    pub reads: Vec<Read>,
    /// Per read, its aligned pairs; `x` is relative to `boundary_start`,
    /// `y` to the trimmed read.
    pub alignments: Vec<Vec<AlignedPair>>,
}

impl ChunkReads {
    /// Number of reads.
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    /// Whether no read overlaps the chunk.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Number of reads starting in the tight window.
    pub fn owned(&self) -> usize {
        self.reads.iter().filter(|read| read.owned).count()
    }
}

fn trim_read(read: &AlignedRead, chunk: &BamChunk, include_soft_clip: bool) -> Option<(Read, Vec<AlignedPair>)> {
    let all_pairs = read.aligned_pairs();
    let (first_aligned, last_aligned) = (all_pairs.first()?.1, all_pairs.last()?.1);
    let pairs: Vec<(usize, usize)> = all_pairs
        .into_iter()
        .filter(|&(x, _)| x >= chunk.boundary_start && x < chunk.boundary_end)
        .collect();
    let &(first_x, first_y) = pairs.first()?;
    let &(last_x, last_y) = pairs.last()?;

    let mut read_start = first_y;
    let mut read_end = last_y + 1;
    if include_soft_clip {
        if first_y == first_aligned {
            let room = first_x - chunk.boundary_start;
            read_start -= read.leading_soft_clip().min(room).min(first_y);
        }
        if last_y == last_aligned {
            let room = chunk.boundary_end - 1 - last_x;
            read_end += read.trailing_soft_clip().min(room).min(read.len() - read_end);
        }
    }

    let bases = read.sequence[read_start..read_end].to_vec();
    let qualities = read.qualities.get(read_start..read_end).unwrap_or_default();
    let mut trimmed = Read::with_qualities(Arc::clone(&read.name), bases, qualities);
    trimmed.owned = chunk.owns(read.clipped_start(include_soft_clip));

    let pairs = pairs
        .into_iter()
        .map(|(x, y)| AlignedPair::new(x - chunk.boundary_start, y - read_start, 1.0))
        .collect();
    Some((trimmed, pairs))
}

/// Fetch and trim every read overlapping the chunk's boundary window.
///
/// Reads are cut to the boundary window; soft-clipped tails survive only
/// with `include_soft_clip` and only where they stay inside the window. A
/// read is owned by the chunk when its start lies in the tight window.
/// Reads left without an aligned base are dropped.
pub fn load_chunk_reads(
    source: &dyn AlignmentSource,
    chunk: &BamChunk,
    include_soft_clip: bool,
) -> Result<ChunkReads, SourceError> {
    let fetched = source.fetch(&chunk.contig, chunk.boundary_start, chunk.boundary_end)?;
    let mut loaded = ChunkReads::default();
    for read in &fetched {
        if let Some((trimmed, pairs)) = trim_read(read, chunk, include_soft_clip) {
            loaded.reads.push(trimmed);
            loaded.alignments.push(pairs);
        }
    }
    debug!(
        contig = %chunk.contig,
        start = chunk.start,
        end = chunk.end,
        fetched = fetched.len(),
        kept = loaded.len(),
        owned = loaded.owned(),
        "loaded chunk reads"
    );
    Ok(loaded)
}
