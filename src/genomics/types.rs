use std::sync::Arc;

/// Phred value htslib uses to mark a missing quality string.
const MISSING_QUALITY: u8 = 0xff;

/// Simple CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// Consuming match/mismatch (`M`).
    Match,
    /// Consuming sequence match (`=`).
    SequenceMatch,
    /// Consuming sequence mismatch (`X`).
    SequenceMismatch,
    /// Insertion relative to the reference.
    Insertion,
    /// Deletion relative to the reference.
    Deletion,
    /// Skipped reference region (`N`).
    RefSkip,
    /// Soft clipping (sequence present in read only).
    SoftClip,
    /// Hard clipping (trimmed sequence not present in read).
    HardClip,
    /// Silent padding.
    Padding,
}

impl CigarOpKind {
    /// Whether the operation advances along the reference.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::SequenceMatch
                | CigarOpKind::SequenceMismatch
                | CigarOpKind::Deletion
                | CigarOpKind::RefSkip
        )
    }

    /// Whether the operation advances along the read sequence.
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::SequenceMatch
                | CigarOpKind::SequenceMismatch
                | CigarOpKind::Insertion
                | CigarOpKind::SoftClip
        )
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

/// Aligned read with sequence and quality information.
#[derive(Debug, Clone)]
pub struct AlignedRead {
    /// Read name.
    pub name: Arc<str>,
    /// Reference contig/chromosome name.
    pub chrom: Arc<str>,
    /// 0-based leftmost reference coordinate of the first aligned base.
    pub pos: usize,
    /// Mapping quality (Phred-scaled).
    pub mapq: u8,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read sequence stored as uppercase ASCII.
    pub sequence: Arc<[u8]>,
    /// Per-base quality scores in Phred space; empty when unavailable.
    pub qualities: Arc<[u8]>,
    /// Whether the read maps to the reverse complement strand.
    pub is_reverse: bool,
}

impl AlignedRead {
    /// Construct a new aligned read wrapper.
    pub fn new(
        name: impl Into<Arc<str>>,
        chrom: impl Into<Arc<str>>,
        pos: usize,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
        qualities: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            chrom: chrom.into(),
            pos,
            mapq: 60,
            cigar,
            sequence: sequence.into(),
            qualities: qualities.into(),
            is_reverse: false,
        }
    }

    /// Set the mapping quality.
    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    /// Set the strand.
    pub fn with_reverse(mut self, is_reverse: bool) -> Self {
        self.is_reverse = is_reverse;
        self
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the read carries no bases.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of reference bases spanned by the CIGAR.
    pub fn reference_length(&self) -> usize {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| op.len as usize)
            .sum()
    }

    /// End position (half-open) on the reference.
    pub fn end(&self) -> usize {
        self.pos + self.reference_length()
    }

    /// Soft-clipped bases at the start of the read.
    pub fn leading_soft_clip(&self) -> usize {
        self.cigar
            .iter()
            .take_while(|op| matches!(op.kind, CigarOpKind::SoftClip | CigarOpKind::HardClip))
            .filter(|op| op.kind == CigarOpKind::SoftClip)
            .map(|op| op.len as usize)
            .sum()
    }

    /// Soft-clipped bases at the end of the read.
    pub fn trailing_soft_clip(&self) -> usize {
        self.cigar
            .iter()
            .rev()
            .take_while(|op| matches!(op.kind, CigarOpKind::SoftClip | CigarOpKind::HardClip))
            .filter(|op| op.kind == CigarOpKind::SoftClip)
            .map(|op| op.len as usize)
            .sum()
    }

    /// Reference start, optionally extended leftwards by the leading soft clip.
    pub fn clipped_start(&self, include_soft_clip: bool) -> usize {
        if include_soft_clip {
            self.pos.saturating_sub(self.leading_soft_clip())
        } else {
            self.pos
        }
    }

    /// Reference end, optionally extended rightwards by the trailing soft clip.
    pub fn clipped_end(&self, include_soft_clip: bool) -> usize {
        if include_soft_clip {
            self.end() + self.trailing_soft_clip()
        } else {
            self.end()
        }
    }

    /// `(reference, read)` coordinates of every aligned base, in order.
    pub fn aligned_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(self.len());
        let mut ref_pos = self.pos;
        let mut read_pos = 0usize;
        for op in &self.cigar {
            let len = op.len as usize;
            match op.kind {
                CigarOpKind::Match | CigarOpKind::SequenceMatch | CigarOpKind::SequenceMismatch => {
                    pairs.extend((0..len).map(|k| (ref_pos + k, read_pos + k)));
                    ref_pos += len;
                    read_pos += len;
                }
                kind => {
                    if kind.consumes_reference() {
                        ref_pos += len;
                    }
                    if kind.consumes_read() {
                        read_pos += len;
                    }
                }
            }
        }
        pairs
    }

    /// Quality score at the provided read offset.
    pub fn quality_at(&self, offset: usize) -> Option<u8> {
        self.qualities.get(offset).copied()
    }

    /// Mapping quality associated with the alignment.
    pub fn mapq(&self) -> u8 {
        self.mapq
    }
}

/// Convert a Phred quality into the probability that the base call is right.
pub fn phred_to_weight(quality: u8) -> f64 {
    if quality == MISSING_QUALITY {
        return 1.0;
    }
    1.0 - 10f64.powf(-(quality as f64) / 10.0)
}

/// Read prepared for graph construction: bases plus per-base reliability weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    /// Read name.
    pub name: Arc<str>,
    /// Uppercase bases.
    pub bases: Vec<u8>,
    /// Per-base weights in `[0, 1]`, parallel to `bases`.
    pub weights: Vec<f64>,
    /// Whether the read starts inside the tight window of the chunk it was loaded for.
    pub owned: bool,
}

impl Read {
    /// Read with every base fully trusted.
    pub fn new(name: impl Into<Arc<str>>, bases: impl Into<Vec<u8>>) -> Self {
        let bases: Vec<u8> = bases.into();
        let weights = vec![1.0; bases.len()];
        Self {
            name: name.into(),
            bases,
            weights,
            owned: true,
        }
    }

    /// Read whose weights derive from Phred qualities; missing qualities mean full trust.
    pub fn with_qualities(name: impl Into<Arc<str>>, bases: impl Into<Vec<u8>>, qualities: &[u8]) -> Self {
        let bases: Vec<u8> = bases.into();
        let weights = if qualities.len() == bases.len() {
            qualities.iter().map(|&q| phred_to_weight(q)).collect()
        } else {
            vec![1.0; bases.len()]
        };
        Self {
            name: name.into(),
            bases,
            weights,
            owned: true,
        }
    }

    /// Number of bases.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Whether the read has no bases.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Weight of the base at `offset`.
    pub fn weight_at(&self, offset: usize) -> f64 {
        self.weights[offset]
    }
}
