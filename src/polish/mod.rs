//! Graph-based consensus polishing.
//!
//! Reads aligned to a draft reference are folded into a partial-order
//! alignment graph, a consensus is extracted and the reads are realigned to
//! it until the consensus stops changing. Optionally the whole pipeline runs
//! on run-length-encoded sequences, with homopolymer lengths restored from a
//! repeat-count model at the end. Large inputs are split into overlapping
//! chunks polished independently.

mod chunker;
mod pairwise;
mod poa;
mod polisher;
mod realign;
mod repeat_model;
mod rle;
mod symbol;

pub use chunker::{load_chunk_reads, BamChunk, BamChunker, ChunkReads, ChunkerError};
pub use pairwise::{log_likelihood, mea_alignment, posteriors, AlignedPair, AlignmentPosteriors};
pub use poa::{
    add_insert, left_shift, remove_delete, Consensus, Poa, PoaDelete, PoaInsert, PoaNode,
    PoaObservation, PoaSummary,
};
pub use polisher::{
    cut_window, ChunkConsensus, ChunkStatus, ChunkedPolisher, ContigConsensus, PolishedRegion, RegionPolisher,
};
pub use realign::{
    check_major_indel_edits_greedily, check_major_indel_edits_greedily_with_edits, compose_maps,
    read_alignments_to_consensus, realign, realign_iterative, IterativeRealignment, ReferenceEdit,
};
pub use repeat_model::{expand_rle_consensus, RepeatObservation, RepeatSubMatrix};
pub use rle::{run_length_encode_alignment, RleString};
pub use symbol::{Symbol, SYMBOL_COUNT};
