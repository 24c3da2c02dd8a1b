//! Run-length encoding of sequences.
//!
//! Collapses homopolymer runs (e.g. `AAAAC` -> `AC` with counts `[4, 1]`) and
//! keeps both coordinate maps, so alignments computed on expanded sequences
//! can be moved into run-length space.

use crate::genomics::Read;
use crate::polish::pairwise::AlignedPair;

/// Run-length-encoded string with its repeat counts and coordinate maps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RleString {
    rle: Vec<u8>,
    repeat_counts: Vec<usize>,
    rle_to_non_rle: Vec<usize>,
    non_rle_to_rle: Vec<usize>,
}

impl RleString {
    /// Collapse maximal runs of identical bytes.
    pub fn encode(sequence: &[u8]) -> Self {
        let mut rle = Vec::new();
        let mut repeat_counts = Vec::new();
        let mut rle_to_non_rle = Vec::new();
        let mut non_rle_to_rle = Vec::with_capacity(sequence.len());

        for (i, &base) in sequence.iter().enumerate() {
            if i == 0 || sequence[i - 1] != base {
                rle.push(base);
                repeat_counts.push(0);
                rle_to_non_rle.push(i);
            }
            let last = rle.len() - 1;
            repeat_counts[last] += 1;
            non_rle_to_rle.push(last);
        }

        Self {
            rle,
            repeat_counts,
            rle_to_non_rle,
            non_rle_to_rle,
        }
    }

    /// Build from explicit symbols and counts. Counts may be zero, in which
    /// case the symbol vanishes from the expansion and its leftmost expanded
    /// position is that of the next symbol.
    pub fn from_runs(rle: Vec<u8>, repeat_counts: Vec<usize>) -> Self {
        assert_eq!(
            rle.len(),
            repeat_counts.len(),
            "every RLE symbol needs a repeat count"
        );
        let mut rle_to_non_rle = Vec::with_capacity(rle.len());
        let mut non_rle_to_rle = Vec::new();
        for (i, &count) in repeat_counts.iter().enumerate() {
            rle_to_non_rle.push(non_rle_to_rle.len());
            non_rle_to_rle.extend(std::iter::repeat(i).take(count));
        }
        Self {
            rle,
            repeat_counts,
            rle_to_non_rle,
            non_rle_to_rle,
        }
    }

    /// Expand back to a standard sequence.
    pub fn expand(&self) -> Vec<u8> {
        let mut expanded = Vec::with_capacity(self.non_rle_len());
        for (&base, &count) in self.rle.iter().zip(&self.repeat_counts) {
            expanded.extend(std::iter::repeat(base).take(count));
        }
        expanded
    }

    /// Length of the RLE string.
    pub fn len(&self) -> usize {
        self.rle.len()
    }

    /// Whether the RLE string is empty.
    pub fn is_empty(&self) -> bool {
        self.rle.is_empty()
    }

    /// Length of the expanded string.
    pub fn non_rle_len(&self) -> usize {
        self.non_rle_to_rle.len()
    }

    /// The collapsed symbols.
    pub fn as_bytes(&self) -> &[u8] {
        &self.rle
    }

    /// Repeat count of every RLE position.
    pub fn repeat_counts(&self) -> &[usize] {
        &self.repeat_counts
    }

    /// Repeat count of one RLE position.
    pub fn repeat_count(&self, rle_position: usize) -> usize {
        self.repeat_counts[rle_position]
    }

    /// Leftmost expanded position of an RLE position.
    pub fn non_rle_position(&self, rle_position: usize) -> usize {
        self.rle_to_non_rle[rle_position]
    }

    /// RLE position covering an expanded position.
    pub fn rle_position(&self, non_rle_position: usize) -> usize {
        self.non_rle_to_rle[non_rle_position]
    }

    /// Map from RLE positions to leftmost expanded positions.
    pub fn rle_to_non_rle_map(&self) -> &[usize] {
        &self.rle_to_non_rle
    }

    /// Map from expanded positions to RLE positions.
    pub fn non_rle_to_rle_map(&self) -> &[usize] {
        &self.non_rle_to_rle
    }

    /// Encode a read; each RLE position is weighted by the mean weight of its run.
    pub fn encode_read(read: &Read) -> (Self, Read) {
        let encoded = Self::encode(&read.bases);
        let weights = (0..encoded.len())
            .map(|i| {
                let start = encoded.non_rle_position(i);
                let count = encoded.repeat_count(i);
                read.weights[start..start + count].iter().sum::<f64>() / count as f64
            })
            .collect();
        let rle_read = Read {
            name: read.name.clone(),
            bases: encoded.as_bytes().to_vec(),
            weights,
            owned: read.owned,
        };
        (encoded, rle_read)
    }
}

/// Translate an alignment between two expanded sequences into RLE space.
///
/// Pairs are mapped through both `non_rle_to_rle` maps; a pair that does not
/// advance strictly in both coordinates past the last emitted pair is dropped,
/// so runs collapsing onto one RLE pair keep only their first pair. Pairs
/// outside either string are dropped.
pub fn run_length_encode_alignment(
    alignment: &[AlignedPair],
    x: &RleString,
    y: &RleString,
) -> Vec<AlignedPair> {
    let mut encoded: Vec<AlignedPair> = Vec::with_capacity(alignment.len());
    for pair in alignment {
        let (Some(&rle_x), Some(&rle_y)) = (x.non_rle_to_rle.get(pair.x), y.non_rle_to_rle.get(pair.y)) else {
            continue;
        };
        if let Some(last) = encoded.last() {
            if rle_x <= last.x || rle_y <= last.y {
                continue;
            }
        }
        encoded.push(AlignedPair::new(rle_x, rle_y, pair.weight));
    }
    encoded
}
