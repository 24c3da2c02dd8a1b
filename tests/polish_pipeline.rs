mod common;

use std::collections::HashSet;

use blake3::hash;
use common::{assert_snapshot, random_sequence, tiled_reads, with_substitutions};
use rosalind_polish::framework::{CancellationToken, ChunkedEvaluator, EvaluatorConfig};
use rosalind_polish::genomics::{ContigInfo, FastaReference, InMemorySource};
use rosalind_polish::polish::{BamChunker, ChunkedPolisher, ContigConsensus, RegionPolisher};
use rosalind_polish::PolishParams;

struct Fixture {
    truth1: Vec<u8>,
    truth2: Vec<u8>,
    draft2: Vec<u8>,
    source: InMemorySource,
    reference: FastaReference,
}

fn fixture() -> Fixture {
    fixture_with_quality(30)
}

fn fixture_with_quality(quality: u8) -> Fixture {
    let truth1 = random_sequence(2500, 7);
    let truth2 = random_sequence(1800, 11);
    let truth3 = random_sequence(500, 13);
    let draft1 = with_substitutions(&truth1, &[250, 999, 1000, 1950, 2300]);
    let draft2 = with_substitutions(&truth2, &[400, 1500]);

    let contigs = vec![
        ContigInfo::new("chr1", truth1.len()),
        ContigInfo::new("chr2", truth2.len()),
        ContigInfo::new("chr3", truth3.len()),
    ];
    let mut reads = tiled_reads("chr1", &truth1, 400, 100, quality);
    // chr2 is only covered up to 800.
    reads.extend(tiled_reads("chr2", &truth2[..800], 400, 100, quality));
    let source = InMemorySource::new(contigs, reads);
    let reference = FastaReference::from_records([
        ("chr1", draft1),
        ("chr2", draft2.clone()),
        ("chr3", truth3),
    ])
    .expect("unique names");

    Fixture {
        truth1,
        truth2,
        draft2,
        source,
        reference,
    }
}

fn polish_with(fixture: &Fixture, threads: usize) -> Vec<ContigConsensus> {
    let params = PolishParams::default().with_chunking(1000, 100);
    let chunker = BamChunker::from_params(&fixture.source, &params).expect("sorted reads");
    let polisher = RegionPolisher::new(params).expect("valid params");
    let config = EvaluatorConfig::default()
        .with_threads(threads)
        .expect("positive thread count");
    let evaluator = ChunkedEvaluator::new(
        ChunkedPolisher::new(polisher, fixture.source.clone(), fixture.reference.clone()),
        config,
    );
    let result = evaluator.evaluate(&chunker).expect("evaluation succeeds");
    assert!(!result.cancelled);
    assert_eq!(result.chunks_processed, result.chunks_total);
    result.output
}

#[test]
fn chunk_windows_match_snapshot() {
    let fixture = fixture();
    let params = PolishParams::default().with_chunking(1000, 100);
    let chunker = BamChunker::from_params(&fixture.source, &params).expect("sorted reads");
    let mut rendered = String::from("contig\tboundary_start\tstart\tend\tboundary_end\n");
    for chunk in chunker {
        rendered.push_str(&format!("{chunk}\n"));
    }
    assert_snapshot("chunks.tsv", &rendered);
}

#[test]
fn chunked_polishing_fixes_substitutions_across_chunk_seams() {
    let fixture = fixture();
    let contigs = polish_with(&fixture, 2);

    let names: Vec<&str> = contigs.iter().map(|c| &*c.contig).collect();
    assert_eq!(names, vec!["chr1", "chr2"]);
    assert_eq!(contigs[0].chunks, 3);
    assert_eq!(contigs[0].sequence, fixture.truth1);
}

#[test]
fn low_quality_reads_polish_across_chunks() {
    let fixture = fixture_with_quality(10);
    let contigs = polish_with(&fixture, 2);

    assert_eq!(contigs[0].sequence, fixture.truth1);
    assert_eq!(contigs[0].polished_chunks, contigs[0].chunks);
    assert_eq!(contigs[1].sequence[..800], fixture.truth2[..800]);
}

#[test]
fn reads_are_counted_once_per_contig() {
    let fixture = fixture();
    let contigs = polish_with(&fixture, 2);

    // Reads start every 100 bases up to the last full tile.
    assert_eq!(contigs[0].reads, 22);
    assert_eq!(contigs[1].reads, 5);
}

#[test]
fn uncovered_windows_keep_the_draft() {
    let fixture = fixture();
    let contigs = polish_with(&fixture, 1);

    let chr2 = &contigs[1];
    assert_eq!(chr2.chunks, 2);
    assert_eq!(chr2.sequence.len(), fixture.truth2.len());
    // Covered error is fixed, the one past the reads is not.
    assert_eq!(chr2.sequence[..800], fixture.truth2[..800]);
    assert_eq!(chr2.sequence[1000..], fixture.draft2[1000..]);
    assert_ne!(chr2.sequence[1500], fixture.truth2[1500]);
}

#[test]
fn output_is_identical_across_thread_counts() {
    let fixture = fixture();
    let mut fingerprints = HashSet::new();
    for threads in [1, 2, 4] {
        let contigs = polish_with(&fixture, threads);
        let mut bytes = Vec::new();
        for contig in &contigs {
            bytes.extend_from_slice(contig.contig.as_bytes());
            bytes.push(b'\n');
            bytes.extend_from_slice(&contig.sequence);
            bytes.push(b'\n');
        }
        fingerprints.insert(hash(&bytes));
    }
    assert_eq!(fingerprints.len(), 1, "outputs diverged across thread counts");
}

#[test]
fn cancelled_runs_skip_every_chunk() {
    let fixture = fixture();
    let params = PolishParams::default().with_chunking(1000, 100);
    let chunker = BamChunker::from_params(&fixture.source, &params).expect("sorted reads");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let evaluator = ChunkedEvaluator::new(
        ChunkedPolisher::new(
            RegionPolisher::new(params).expect("valid params"),
            fixture.source.clone(),
            fixture.reference.clone(),
        ),
        EvaluatorConfig::default(),
    )
    .with_cancellation(cancel);

    let result = evaluator.evaluate(&chunker).expect("evaluation succeeds");
    assert!(result.cancelled);
    assert_eq!(result.chunks_processed, 0);
    assert_eq!(result.chunks_total, 5);
    assert!(result.output.is_empty());
}
