use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bio::io::fasta;
use clap::{Args, Parser, Subcommand};
use rosalind_polish::framework::{ChunkedEvaluator, EvaluatorConfig};
use rosalind_polish::genomics::{BamSource, FastaReference};
use rosalind_polish::polish::{BamChunker, ChunkedPolisher, RegionPolisher};
use rosalind_polish::PolishParams;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rosalind-polish", about = "Graph-based consensus polishing of draft assemblies")]
struct Cli {
    /// Only log warnings and errors.
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// JSON parameter file; unset fields keep their defaults.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Override the tight chunk size.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Override the chunk boundary size.
    #[arg(long)]
    chunk_boundary: Option<usize>,
    /// Build graphs on run-length-encoded sequences.
    #[arg(long)]
    rle: bool,
    /// Count soft-clipped bases toward read extents.
    #[arg(long)]
    soft_clip: bool,
}

impl ParamArgs {
    fn load(&self) -> Result<PolishParams> {
        let mut params = match &self.params {
            Some(path) => PolishParams::from_json_file(path)
                .with_context(|| format!("failed to load parameters from {}", path.display()))?,
            None => PolishParams::default(),
        };
        if let Some(size) = self.chunk_size {
            params.chunk_size = size;
        }
        if let Some(boundary) = self.chunk_boundary {
            params.chunk_boundary = boundary;
        }
        if self.rle {
            params.use_run_length_encoding = true;
        }
        if self.soft_clip {
            params.include_soft_clip = true;
        }
        params.validate().context("invalid parameters")?;
        Ok(params)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Polish a draft reference with reads from an indexed BAM.
    Polish {
        /// Draft reference (FASTA).
        reference: PathBuf,
        /// Coordinate-sorted, indexed BAM of reads aligned to the draft.
        bam: PathBuf,
        /// Output FASTA (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads (rayon default when omitted).
        #[arg(short, long)]
        threads: Option<usize>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// List the chunk windows of a BAM as TSV.
    Chunks {
        /// Coordinate-sorted BAM.
        bam: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Print the effective parameters as JSON.
    Params {
        #[command(flatten)]
        params: ParamArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Polish {
            reference,
            bam,
            output,
            threads,
            params,
        } => run_polish(reference, bam, output, threads, params.load()?)?,
        Commands::Chunks { bam, params } => run_chunks(bam, params.load()?)?,
        Commands::Params { params } => {
            let params = params.load()?;
            info!("{params}");
            println!("{}", params.to_json().context("failed to serialize parameters")?);
        }
    }

    Ok(())
}

fn run_polish(
    reference_path: PathBuf,
    bam_path: PathBuf,
    output: Option<PathBuf>,
    threads: Option<usize>,
    params: PolishParams,
) -> Result<()> {
    let reference = FastaReference::from_path(&reference_path)
        .with_context(|| format!("failed to read reference from {}", reference_path.display()))?;
    let source = BamSource::new(&bam_path);
    let chunker = BamChunker::from_params(&source, &params)
        .with_context(|| format!("failed to chunk {}", bam_path.display()))?;
    info!(chunks = chunker.len(), "polishing");

    let mut config = EvaluatorConfig::default();
    if let Some(threads) = threads {
        config = config.with_threads(threads).context("invalid thread count")?;
    }
    let polisher = RegionPolisher::new(params).context("invalid parameters")?;
    let evaluator = ChunkedEvaluator::new(ChunkedPolisher::new(polisher, source, reference.clone()), config);
    let result = evaluator.evaluate(&chunker).context("polishing failed")?;
    if result.cancelled {
        warn!(
            processed = result.chunks_processed,
            total = result.chunks_total,
            "polishing stopped early"
        );
    }

    let polished: HashMap<String, Vec<u8>> = result
        .output
        .into_iter()
        .map(|contig| {
            info!(
                contig = %contig.contig,
                chunks = contig.chunks,
                polished_chunks = contig.polished_chunks,
                reads = contig.reads,
                length = contig.sequence.len(),
                "polished contig"
            );
            (contig.contig.to_string(), contig.sequence)
        })
        .collect();

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = fasta::Writer::new(sink);
    for name in reference.names() {
        let sequence = match polished.get(name) {
            Some(sequence) => sequence.as_slice(),
            None => {
                info!(contig = name, "not polished, copying draft");
                reference.sequence(name).unwrap_or_default()
            }
        };
        writer
            .write(name, None, sequence)
            .with_context(|| format!("failed to write contig {name}"))?;
    }
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn run_chunks(bam_path: PathBuf, params: PolishParams) -> Result<()> {
    let source = BamSource::new(&bam_path);
    let chunker = BamChunker::from_params(&source, &params)
        .with_context(|| format!("failed to chunk {}", bam_path.display()))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "contig\tboundary_start\tstart\tend\tboundary_end")?;
    for chunk in chunker {
        writeln!(out, "{chunk}")?;
    }
    out.flush()?;
    Ok(())
}
