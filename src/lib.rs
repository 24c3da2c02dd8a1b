//! # Graph-based consensus polishing
//!
//! This library polishes a draft sequence with noisy reads aligned to it.
//!
//! ## Core Algorithm
//!
//! 1. **Graph construction**: every read is aligned to the draft with a pair
//!    HMM and its posterior matches, inserts and deletes are folded into a
//!    partial-order alignment graph (one node per draft base)
//! 2. **Consensus**: the heaviest base per node, with deletes and inserts
//!    applied when they carry enough of the local weight
//! 3. **Iterative realignment**: reads are realigned to the consensus,
//!    anchored on their confident pairs, until the consensus stops changing
//! 4. **Run-length mode**: optionally all of the above runs on
//!    run-length-encoded sequences and homopolymer lengths are restored by a
//!    maximum-likelihood repeat-count model
//!
//! Large alignment files are split into overlapping chunks that are polished
//! independently on a thread pool and stitched back together.
//!
//! ## Usage Example
//!
//! ```no_run
//! use rosalind_polish::framework::CancellationToken;
//! use rosalind_polish::genomics::Read;
//! use rosalind_polish::{PolishParams, RegionPolisher};
//!
//! let polisher = RegionPolisher::new(PolishParams::default())?;
//! let reads = vec![Read::new("r1", b"ACGTTGCA".to_vec()), Read::new("r2", b"ACGTTGCA".to_vec())];
//! let region = polisher.polish(b"ACGTAGCA", &reads, &[Vec::new(), Vec::new()], &CancellationToken::new());
//! println!("{}", String::from_utf8_lossy(&region.consensus));
//! # Ok::<(), rosalind_polish::params::ParamsError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod framework; // Chunked parallel evaluation
pub mod genomics; // Reads, alignments and file adapters
pub mod params; // Run parameters
pub mod polish; // Graph, consensus, realignment, chunking
/// Python bindings for exposing the polisher to external runtimes.
#[cfg(feature = "python-bindings")]
pub mod python_bindings;

// Re-exports for convenience
pub use framework::{CancellationToken, ChunkedEvaluator, EvaluatorConfig};
pub use params::{AlignmentParams, PolishParams, RepeatModelParams};
pub use polish::{
    BamChunk, BamChunker, ChunkedPolisher, Consensus, Poa, PolishedRegion, RegionPolisher,
    RepeatSubMatrix, RleString,
};
