//! Alignment and reference inputs.
//!
//! [`AlignmentSource`] and [`ReferenceSource`] are the seams the chunker and
//! polisher read through; BAM files go through rust-htslib, FASTA files are
//! read into memory with `bio`.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bio::io::fasta;
use rust_htslib::bam::{self, header::Header, header::HeaderRecord, record::Cigar, Read as _, Writer};
use thiserror::Error;

use crate::genomics::{AlignedRead, CigarOp, CigarOpKind};

/// Errors raised by alignment and reference sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// htslib failed to open or decode a file.
    #[error("htslib error on {path}: {source}")]
    Htslib {
        /// File being read.
        path: PathBuf,
        /// Underlying htslib error.
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// Plain I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Contig missing from the source.
    #[error("unknown contig {0}")]
    UnknownContig(String),

    /// Region outside the contig.
    #[error("region {contig}:{start}-{end} outside contig of length {length}")]
    RegionOutOfBounds {
        /// Contig name.
        contig: String,
        /// Requested start.
        start: usize,
        /// Requested end.
        end: usize,
        /// Contig length.
        length: usize,
    },

    /// Records are not coordinate-sorted.
    #[error("alignments are not coordinate-sorted: {contig}:{pos} after {previous_contig}:{previous_pos}")]
    Unsorted {
        /// Contig of the offending record.
        contig: String,
        /// Position of the offending record.
        pos: usize,
        /// Contig of the previous record.
        previous_contig: String,
        /// Position of the previous record.
        previous_pos: usize,
    },

    /// FASTA input could not be parsed.
    #[error("malformed FASTA: {0}")]
    Fasta(String),
}

/// Name and length of a contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigInfo {
    /// Contig name.
    pub name: Arc<str>,
    /// Contig length in bases.
    pub length: usize,
}

impl ContigInfo {
    /// Construct contig metadata.
    pub fn new(name: impl Into<Arc<str>>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Source of aligned reads.
///
/// Only primary, mapped records carrying a sequence are reported.
pub trait AlignmentSource: Sync {
    /// Contigs in header order.
    fn contigs(&self) -> Result<Vec<ContigInfo>, SourceError>;

    /// Visit every usable record in file order.
    fn scan(&self, visit: &mut dyn FnMut(&AlignedRead)) -> Result<(), SourceError>;

    /// Records overlapping `[start, end)` on `contig`.
    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<AlignedRead>, SourceError>;
}

/// Reads held in memory, reported in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    contigs: Vec<ContigInfo>,
    reads: Vec<AlignedRead>,
}

impl InMemorySource {
    /// Source over `reads` aligned to `contigs`.
    pub fn new(contigs: Vec<ContigInfo>, reads: Vec<AlignedRead>) -> Self {
        Self { contigs, reads }
    }

    /// Append a read.
    pub fn push(&mut self, read: AlignedRead) {
        self.reads.push(read);
    }
}

impl AlignmentSource for InMemorySource {
    fn contigs(&self) -> Result<Vec<ContigInfo>, SourceError> {
        Ok(self.contigs.clone())
    }

    fn scan(&self, visit: &mut dyn FnMut(&AlignedRead)) -> Result<(), SourceError> {
        self.reads.iter().filter(|read| !read.is_empty()).for_each(visit);
        Ok(())
    }

    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<AlignedRead>, SourceError> {
        if !self.contigs.iter().any(|c| &*c.name == contig) {
            return Err(SourceError::UnknownContig(contig.to_string()));
        }
        Ok(self
            .reads
            .iter()
            .filter(|read| &*read.chrom == contig && !read.is_empty())
            .filter(|read| read.pos < end && read.end() > start)
            .cloned()
            .collect())
    }
}

/// Indexed BAM file read through rust-htslib.
///
/// A fresh reader is opened per call, so the source can be shared between
/// worker threads.
#[derive(Debug, Clone)]
pub struct BamSource {
    path: PathBuf,
}

impl BamSource {
    /// Source over the BAM at `path`; the index must sit next to it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the BAM file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn htslib_error(&self, source: rust_htslib::errors::Error) -> SourceError {
        SourceError::Htslib {
            path: self.path.clone(),
            source,
        }
    }
}

fn convert_cigar(op: &Cigar) -> CigarOp {
    match *op {
        Cigar::Match(len) => CigarOp::new(CigarOpKind::Match, len),
        Cigar::Equal(len) => CigarOp::new(CigarOpKind::SequenceMatch, len),
        Cigar::Diff(len) => CigarOp::new(CigarOpKind::SequenceMismatch, len),
        Cigar::Ins(len) => CigarOp::new(CigarOpKind::Insertion, len),
        Cigar::Del(len) => CigarOp::new(CigarOpKind::Deletion, len),
        Cigar::RefSkip(len) => CigarOp::new(CigarOpKind::RefSkip, len),
        Cigar::SoftClip(len) => CigarOp::new(CigarOpKind::SoftClip, len),
        Cigar::HardClip(len) => CigarOp::new(CigarOpKind::HardClip, len),
        Cigar::Pad(len) => CigarOp::new(CigarOpKind::Padding, len),
    }
}

fn usable(record: &bam::Record) -> bool {
    !record.is_unmapped() && !record.is_secondary() && record.tid() >= 0 && record.seq_len() > 0
}

fn convert_record(record: &bam::Record, chrom: Arc<str>) -> AlignedRead {
    let cigar = record.cigar().iter().map(convert_cigar).collect();
    let sequence = record.seq().as_bytes().to_ascii_uppercase();
    AlignedRead::new(
        String::from_utf8_lossy(record.qname()).into_owned(),
        chrom,
        record.pos().max(0) as usize,
        cigar,
        sequence,
        record.qual().to_vec(),
    )
    .with_mapq(record.mapq())
    .with_reverse(record.is_reverse())
}

fn contig_names(header: &bam::HeaderView) -> Vec<Arc<str>> {
    (0..header.target_count())
        .map(|tid| Arc::from(String::from_utf8_lossy(header.tid2name(tid)).into_owned()))
        .collect()
}

impl AlignmentSource for BamSource {
    fn contigs(&self) -> Result<Vec<ContigInfo>, SourceError> {
        let reader = bam::Reader::from_path(&self.path).map_err(|e| self.htslib_error(e))?;
        let header = reader.header();
        Ok(contig_names(header)
            .into_iter()
            .enumerate()
            .map(|(tid, name)| {
                let length = header.target_len(tid as u32).unwrap_or(0) as usize;
                ContigInfo { name, length }
            })
            .collect())
    }

    fn scan(&self, visit: &mut dyn FnMut(&AlignedRead)) -> Result<(), SourceError> {
        let mut reader = bam::Reader::from_path(&self.path).map_err(|e| self.htslib_error(e))?;
        let names = contig_names(reader.header());
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.map_err(|e| self.htslib_error(e))?;
            if !usable(&record) {
                continue;
            }
            let Some(name) = names.get(record.tid() as usize) else {
                continue;
            };
            visit(&convert_record(&record, Arc::clone(name)));
        }
        Ok(())
    }

    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<AlignedRead>, SourceError> {
        let mut reader = bam::IndexedReader::from_path(&self.path).map_err(|e| self.htslib_error(e))?;
        if reader.header().tid(contig.as_bytes()).is_none() {
            return Err(SourceError::UnknownContig(contig.to_string()));
        }
        reader
            .fetch((contig, start as i64, end as i64))
            .map_err(|e| self.htslib_error(e))?;

        let chrom: Arc<str> = Arc::from(contig);
        let mut reads = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| self.htslib_error(e))?;
            if usable(&record) {
                reads.push(convert_record(&record, Arc::clone(&chrom)));
            }
        }
        Ok(reads)
    }
}

/// Create a coordinate-sorted BAM writer whose header lists `contigs`.
///
/// The caller is responsible for writing alignment records using the returned writer.
pub fn create_bam_writer<P: AsRef<Path>>(
    output_path: P,
    contigs: &[ContigInfo],
) -> Result<Writer, SourceError> {
    let mut header = Header::new();

    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", &"1.6");
    hd.push_tag(b"SO", &"coordinate");
    header.push_record(&hd);

    for contig in contigs {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", &*contig.name);
        sq.push_tag(b"LN", &(contig.length as i64));
        header.push_record(&sq);
    }

    bam::Writer::from_path(output_path.as_ref(), &header, bam::Format::Bam).map_err(|source| {
        SourceError::Htslib {
            path: output_path.as_ref().to_path_buf(),
            source,
        }
    })
}

/// Source of reference bases.
pub trait ReferenceSource: Sync {
    /// Length of `contig`, if known.
    fn contig_length(&self, contig: &str) -> Option<usize>;

    /// Uppercase bases of `contig` in `[start, end)`.
    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>, SourceError>;
}

/// Multi-record FASTA held in memory.
#[derive(Debug, Clone, Default)]
pub struct FastaReference {
    records: Vec<(Arc<str>, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl FastaReference {
    /// Read the FASTA file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(file)
    }

    /// Read FASTA records with `bio`. Record names stop at the first
    /// whitespace; bases are uppercased.
    pub fn parse(reader: impl io::Read) -> Result<Self, SourceError> {
        let mut reference = Self::default();
        for record in fasta::Reader::new(reader).records() {
            let record = record.map_err(|err| SourceError::Fasta(err.to_string()))?;
            if record.id().is_empty() {
                return Err(SourceError::Fasta("record without a name".to_string()));
            }
            reference.insert(record.id().to_string(), record.seq().to_ascii_uppercase())?;
        }
        Ok(reference)
    }

    /// Reference built from explicit records.
    pub fn from_records<I, N>(records: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        let mut reference = Self::default();
        for (name, sequence) in records {
            reference.insert(name.into(), sequence.to_ascii_uppercase())?;
        }
        Ok(reference)
    }

    fn insert(&mut self, name: String, sequence: Vec<u8>) -> Result<(), SourceError> {
        if self.index.contains_key(&name) {
            return Err(SourceError::Fasta(format!("duplicate record {name}")));
        }
        self.index.insert(name.clone(), self.records.len());
        self.records.push((Arc::from(name), sequence));
        Ok(())
    }

    /// Record names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|(name, _)| &**name)
    }

    /// Full sequence of a record.
    pub fn sequence(&self, contig: &str) -> Option<&[u8]> {
        self.index.get(contig).map(|&i| self.records[i].1.as_slice())
    }

    /// Contig metadata for every record.
    pub fn contigs(&self) -> Vec<ContigInfo> {
        self.records
            .iter()
            .map(|(name, sequence)| ContigInfo {
                name: Arc::clone(name),
                length: sequence.len(),
            })
            .collect()
    }
}

impl ReferenceSource for FastaReference {
    fn contig_length(&self, contig: &str) -> Option<usize> {
        self.sequence(contig).map(<[u8]>::len)
    }

    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>, SourceError> {
        let sequence = self
            .sequence(contig)
            .ok_or_else(|| SourceError::UnknownContig(contig.to_string()))?;
        if start > end || end > sequence.len() {
            return Err(SourceError::RegionOutOfBounds {
                contig: contig.to_string(),
                start,
                end,
                length: sequence.len(),
            });
        }
        Ok(sequence[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FASTA: &str = ">chr1 first contig\nACGTac\ngt\n\n>chr2\nTTTT\n";

    #[test]
    fn fasta_records_are_parsed_and_uppercased() {
        let reference = FastaReference::parse(FASTA.as_bytes()).expect("valid FASTA");
        assert_eq!(reference.names().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
        assert_eq!(reference.sequence("chr1"), Some(&b"ACGTACGT"[..]));
        assert_eq!(reference.fetch("chr1", 2, 5).expect("in range"), b"GTA".to_vec());
        assert_eq!(reference.contig_length("chr2"), Some(4));
    }

    #[test]
    fn fasta_errors_are_reported() {
        assert!(matches!(
            FastaReference::parse("ACGT\n".as_bytes()),
            Err(SourceError::Fasta(_))
        ));
        assert!(matches!(
            FastaReference::parse(">a\nA\n>a\nC\n".as_bytes()),
            Err(SourceError::Fasta(_))
        ));
        let reference = FastaReference::parse(FASTA.as_bytes()).expect("valid FASTA");
        assert!(matches!(
            reference.fetch("chr2", 2, 9),
            Err(SourceError::RegionOutOfBounds { length: 4, .. })
        ));
        assert!(matches!(
            reference.fetch("chrX", 0, 1),
            Err(SourceError::UnknownContig(_))
        ));
    }

    #[test]
    fn written_records_read_back() {
        let mut bytes = Vec::new();
        {
            let mut writer = fasta::Writer::new(&mut bytes);
            writer.write("polished", None, b"ACGTACGTAC").expect("write to memory");
            writer.write("copied", Some("draft"), b"TTGA").expect("write to memory");
            writer.flush().expect("flush to memory");
        }
        let reference = FastaReference::parse(bytes.as_slice()).expect("valid FASTA");
        assert_eq!(reference.names().collect::<Vec<_>>(), vec!["polished", "copied"]);
        assert_eq!(reference.sequence("copied"), Some(&b"TTGA"[..]));
    }

    #[test]
    fn in_memory_fetch_returns_overlapping_reads() {
        let cigar = vec![CigarOp::new(CigarOpKind::Match, 4)];
        let reads = vec![
            AlignedRead::new("a", "chr1", 0, cigar.clone(), b"ACGT".to_vec(), Vec::new()),
            AlignedRead::new("b", "chr1", 10, cigar.clone(), b"ACGT".to_vec(), Vec::new()),
            AlignedRead::new("c", "chr2", 0, cigar, b"ACGT".to_vec(), Vec::new()),
        ];
        let source = InMemorySource::new(
            vec![ContigInfo::new("chr1", 20), ContigInfo::new("chr2", 20)],
            reads,
        );
        let fetched = source.fetch("chr1", 3, 11).expect("known contig");
        let names: Vec<&str> = fetched.iter().map(|r| &*r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(source.fetch("chr1", 4, 10).expect("known contig").is_empty());
        assert!(matches!(
            source.fetch("chr9", 0, 1),
            Err(SourceError::UnknownContig(_))
        ));
    }
}
