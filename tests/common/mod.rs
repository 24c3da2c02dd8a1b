#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rosalind_polish::genomics::{AlignedRead, CigarOp, CigarOpKind};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("POLISH_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set POLISH_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Deterministic pseudo-random DNA.
pub fn random_sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect()
}

/// Copy of `sequence` with a substitution at each of `positions`.
pub fn with_substitutions(sequence: &[u8], positions: &[usize]) -> Vec<u8> {
    let mut draft = sequence.to_vec();
    for &pos in positions {
        draft[pos] = match draft[pos] {
            b'A' => b'C',
            b'C' => b'G',
            b'G' => b'T',
            _ => b'A',
        };
    }
    draft
}

/// Gap-free reads of `truth` of length `read_len` every `step` bases, all at
/// base quality `quality`.
pub fn tiled_reads(
    contig: &str,
    truth: &[u8],
    read_len: usize,
    step: usize,
    quality: u8,
) -> Vec<AlignedRead> {
    let mut reads = Vec::new();
    let mut start = 0;
    while start < truth.len() {
        let end = (start + read_len).min(truth.len());
        reads.push(AlignedRead::new(
            format!("{contig}_{start}"),
            contig,
            start,
            vec![CigarOp::new(CigarOpKind::Match, (end - start) as u32)],
            truth[start..end].to_vec(),
            vec![quality; end - start],
        ));
        if end == truth.len() {
            break;
        }
        start += step;
    }
    reads
}
