use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while running the chunked evaluator.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Configuration invalid (e.g., zero threads).
    #[error("invalid evaluator configuration: {0}")]
    InvalidConfiguration(String),

    /// Requested chunk index is out of range.
    #[error("chunk id {chunk_id} out of range (have {num_chunks})")]
    ChunkOutOfRange {
        /// Chunk index that was requested.
        chunk_id: usize,
        /// Number of chunks.
        num_chunks: usize,
    },

    /// User-supplied processor reported an error.
    #[error("processor error: {0}")]
    Processor(String),
}

impl FrameworkError {
    /// Helper for constructing processor-originated errors.
    pub fn processor_failure(msg: impl Into<String>) -> Self {
        FrameworkError::Processor(msg.into())
    }
}

/// Shared flag used to stop scheduling further work.
///
/// Clones observe the same flag. Evaluators check it before each chunk and
/// the realignment loop checks it between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Configuration for chunked evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorConfig {
    /// Worker threads; `None` uses rayon's global pool.
    pub threads: Option<usize>,
    /// Log every chunk as it completes.
    pub verbose: bool,
}

impl EvaluatorConfig {
    /// Run on a dedicated pool with `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, FrameworkError> {
        if threads == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "thread count must be > 0".to_string(),
            ));
        }
        self.threads = Some(threads);
        Ok(self)
    }

    /// Enable verbose mode.
    pub fn with_verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }
}

/// Per-chunk metadata supplied to processors.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    /// 0-based chunk index.
    pub chunk_id: usize,
    /// Reference range covered by the chunk's tight window.
    pub range: Range<usize>,
    /// Token to poll during long-running work.
    pub cancel: CancellationToken,
}

impl ChunkContext {
    /// Number of reference positions covered by this chunk.
    pub fn len(&self) -> usize {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Whether the chunk covers nothing.
    pub fn is_empty(&self) -> bool {
        self.range.end <= self.range.start
    }
}

/// Trait implemented by processors that handle independent chunks.
///
/// Chunks share no mutable state, so `process_chunk` takes `&self` and may run
/// on any worker thread.
pub trait ChunkProcessor: Sync {
    /// Type describing the full input workload.
    type Input: Sync;
    /// Summary emitted per chunk.
    type ChunkSummary: Send;
    /// Final output type produced after evaluation.
    type Output;

    /// Number of chunks in `input`.
    fn num_chunks(&self, input: &Self::Input) -> usize;

    /// Tight reference range of a chunk.
    fn chunk_range(&self, input: &Self::Input, chunk_id: usize) -> Result<Range<usize>, FrameworkError>;

    /// Process a single chunk.
    fn process_chunk(
        &self,
        input: &Self::Input,
        context: &ChunkContext,
    ) -> Result<Self::ChunkSummary, FrameworkError>;

    /// Combine the summaries of every processed chunk, given in chunk order.
    fn finalize(
        &self,
        summaries: Vec<Self::ChunkSummary>,
        input: &Self::Input,
    ) -> Result<Self::Output, FrameworkError>;
}

/// Result returned by the chunked evaluator.
#[derive(Debug)]
pub struct EvaluationResult<O> {
    /// Final output synthesized from the chunk summaries.
    pub output: O,
    /// Number of chunks that ran.
    pub chunks_processed: usize,
    /// Number of chunks in the workload.
    pub chunks_total: usize,
    /// Whether cancellation cut the run short.
    pub cancelled: bool,
}

/// Evaluator that spreads chunks over a rayon pool and merges in chunk order.
#[derive(Debug)]
pub struct ChunkedEvaluator<P: ChunkProcessor> {
    processor: P,
    config: EvaluatorConfig,
    cancel: CancellationToken,
}

impl<P: ChunkProcessor> ChunkedEvaluator<P> {
    /// Create a new evaluator with the provided processor and configuration.
    pub fn new(processor: P, config: EvaluatorConfig) -> Self {
        Self {
            processor,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Access configuration.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Access the processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute evaluation and return the final output and metadata.
    ///
    /// Chunks skipped because of cancellation are absent from the summaries
    /// handed to [`ChunkProcessor::finalize`].
    pub fn evaluate(&self, input: &P::Input) -> Result<EvaluationResult<P::Output>, FrameworkError> {
        let chunks_total = self.processor.num_chunks(input);
        let summaries = match self.config.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| FrameworkError::InvalidConfiguration(e.to_string()))?;
                pool.install(|| self.run_chunks(input, chunks_total))?
            }
            None => self.run_chunks(input, chunks_total)?,
        };

        let chunks_processed = summaries.iter().filter(|s| s.is_some()).count();
        let cancelled = chunks_processed < chunks_total;
        let output = self
            .processor
            .finalize(summaries.into_iter().flatten().collect(), input)?;

        Ok(EvaluationResult {
            output,
            chunks_processed,
            chunks_total,
            cancelled,
        })
    }

    fn run_chunks(
        &self,
        input: &P::Input,
        chunks_total: usize,
    ) -> Result<Vec<Option<P::ChunkSummary>>, FrameworkError> {
        (0..chunks_total)
            .into_par_iter()
            .map(|chunk_id| {
                if self.cancel.is_cancelled() {
                    return Ok(None);
                }
                let context = ChunkContext {
                    chunk_id,
                    range: self.processor.chunk_range(input, chunk_id)?,
                    cancel: self.cancel.clone(),
                };
                let summary = self.processor.process_chunk(input, &context)?;
                if self.config.verbose {
                    debug!(chunk_id, start = context.range.start, end = context.range.end, "chunk finished");
                }
                Ok(Some(summary))
            })
            .collect()
    }
}
