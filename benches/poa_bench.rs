//! Graph construction and consensus benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rosalind_polish::framework::CancellationToken;
use rosalind_polish::genomics::Read;
use rosalind_polish::polish::{realign, AlignedPair, RegionPolisher, RleString};
use rosalind_polish::PolishParams;

fn sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect()
}

fn setup(len: usize, coverage: usize) -> (Vec<u8>, Vec<Read>, Vec<Vec<AlignedPair>>) {
    let truth = sequence(len, 17);
    let mut reference = truth.clone();
    for pos in (50..len).step_by(97) {
        reference[pos] = if reference[pos] == b'A' { b'C' } else { b'A' };
    }
    let reads: Vec<Read> = (0..coverage)
        .map(|k| Read::new(format!("r{k}"), truth.clone()))
        .collect();
    let diagonal: Vec<AlignedPair> = (0..len).map(|i| AlignedPair::new(i, i, 1.0)).collect();
    (reference, reads, vec![diagonal; coverage])
}

fn benchmark_graph(c: &mut Criterion) {
    let params = PolishParams::default();
    let (reference, reads, anchors) = setup(1000, 10);

    c.bench_function("realign_1kb_10x", |b| {
        b.iter(|| black_box(realign(&reads, &anchors, &reference, &params)));
    });

    let poa = realign(&reads, &anchors, &reference, &params);
    c.bench_function("consensus_1kb_10x", |b| {
        b.iter(|| black_box(poa.consensus(&params)));
    });
}

fn benchmark_polish(c: &mut Criterion) {
    let (reference, reads, anchors) = setup(1000, 10);
    let polisher = RegionPolisher::new(PolishParams::default()).expect("valid params");
    let rle_polisher = RegionPolisher::new(PolishParams::default().with_run_length_encoding(true))
        .expect("valid params");
    let cancel = CancellationToken::new();

    c.bench_function("polish_1kb_10x", |b| {
        b.iter(|| black_box(polisher.polish(&reference, &reads, &anchors, &cancel)));
    });
    c.bench_function("polish_rle_1kb_10x", |b| {
        b.iter(|| black_box(rle_polisher.polish(&reference, &reads, &anchors, &cancel)));
    });
    c.bench_function("rle_encode_1kb", |b| {
        b.iter(|| black_box(RleString::encode(&reference)));
    });
}

criterion_group!(benches, benchmark_graph, benchmark_polish);
criterion_main!(benches);
