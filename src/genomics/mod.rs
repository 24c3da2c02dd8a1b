//! Genomics data types and input/output adapters.
//!
//! Aligned reads as they come out of an alignment file, reads prepared for
//! graph construction, and the sources the polisher reads through.

mod io;
mod types;

pub use io::{
    create_bam_writer, AlignmentSource, BamSource, ContigInfo, FastaReference,
    InMemorySource, ReferenceSource, SourceError,
};
pub use types::{phred_to_weight, AlignedRead, CigarOp, CigarOpKind, Read};
