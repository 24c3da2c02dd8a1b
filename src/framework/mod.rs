//! Chunked evaluation framework.
//!
//! Splits a workload into independent chunks, runs them on a rayon pool and
//! hands the per-chunk summaries back in chunk order.

mod chunked_eval;

pub use chunked_eval::{
    CancellationToken, ChunkContext, ChunkProcessor, ChunkedEvaluator, EvaluationResult,
    EvaluatorConfig, FrameworkError,
};
