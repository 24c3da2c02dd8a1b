//! Repeat-count probability model.
//!
//! Gives `log P(observed | underlying)` for homopolymer run lengths per base
//! and picks the maximum-likelihood underlying count for a set of weighted
//! observations. Used to turn a run-length consensus back into bases.

use crate::params::{ParamsError, RepeatModelParams};
use crate::polish::poa::Poa;
use crate::polish::rle::RleString;
use crate::polish::symbol::{Symbol, SYMBOL_COUNT};

/// One read's observed run length at a consensus position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatObservation {
    /// Observed run length.
    pub repeat_count: usize,
    /// Reliability weight of the read base.
    pub weight: f64,
}

impl RepeatObservation {
    /// Construct an observation.
    pub fn new(repeat_count: usize, weight: f64) -> Self {
        Self {
            repeat_count,
            weight,
        }
    }
}

/// Dense `(base, observed, underlying)` log-probability table.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatSubMatrix {
    max_repeat_length: usize,
    log_probabilities: Vec<f64>,
}

impl RepeatSubMatrix {
    /// Parametric model `P(o | u) ∝ exp(-λ(u)·|o - u|)` with
    /// `λ(u) = decay / (1 + growth·u)`, normalized over `o` for each `u`.
    /// Every base shares the same rows.
    pub fn parametric(max_repeat_length: usize, decay: f64, growth: f64) -> Self {
        let width = max_repeat_length + 1;
        let mut rows = vec![0.0f64; width * width];
        for underlying in 0..width {
            let lambda = decay / (1.0 + growth * underlying as f64);
            let unnormalized: Vec<f64> = (0..width)
                .map(|observed| -lambda * observed.abs_diff(underlying) as f64)
                .collect();
            let max = unnormalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let log_norm = max + unnormalized.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
            for (observed, value) in unnormalized.into_iter().enumerate() {
                rows[observed * width + underlying] = value - log_norm;
            }
        }

        let mut log_probabilities = Vec::with_capacity(SYMBOL_COUNT * width * width);
        for _ in 0..SYMBOL_COUNT {
            log_probabilities.extend_from_slice(&rows);
        }
        Self {
            max_repeat_length,
            log_probabilities,
        }
    }

    /// Parametric model with any explicit per-base tables applied on top.
    pub fn from_params(params: &RepeatModelParams) -> Result<Self, ParamsError> {
        let mut matrix = Self::parametric(params.max_repeat_length, params.decay, params.growth);
        let width = params.max_repeat_length + 1;
        for table in &params.tables {
            let base = table.base.to_ascii_uppercase();
            if !base.is_ascii() || !"ACGTN".contains(base) {
                return Err(ParamsError::invalid(
                    "repeat_model.tables",
                    format!("unknown base '{}'", table.base),
                ));
            }
            if table.log_probabilities.len() != width
                || table.log_probabilities.iter().any(|row| row.len() != width)
            {
                return Err(ParamsError::invalid(
                    "repeat_model.tables",
                    format!("table for '{}' must be {width}x{width}", table.base),
                ));
            }
            let symbol = Symbol::from_base(base as u8);
            for (observed, row) in table.log_probabilities.iter().enumerate() {
                for (underlying, &value) in row.iter().enumerate() {
                    matrix.set_log_prob(symbol, observed, underlying, value);
                }
            }
        }
        Ok(matrix)
    }

    /// Largest count represented.
    pub fn max_repeat_length(&self) -> usize {
        self.max_repeat_length
    }

    fn index(&self, symbol: Symbol, observed: usize, underlying: usize) -> usize {
        let width = self.max_repeat_length + 1;
        let observed = observed.min(self.max_repeat_length);
        let underlying = underlying.min(self.max_repeat_length);
        (symbol.index() * width + observed) * width + underlying
    }

    /// `log P(observed | underlying)` for `base`; counts are clamped to the maximum.
    pub fn log_prob(&self, base: u8, observed: usize, underlying: usize) -> f64 {
        self.log_probabilities[self.index(Symbol::from_base(base), observed, underlying)]
    }

    /// Overwrite one entry.
    pub fn set_log_prob(&mut self, symbol: Symbol, observed: usize, underlying: usize, value: f64) {
        let idx = self.index(symbol, observed, underlying);
        self.log_probabilities[idx] = value;
    }

    /// Weighted sum of the observations' log-probabilities under `underlying`.
    pub fn log_prob_for_observations(
        &self,
        base: u8,
        observations: &[RepeatObservation],
        underlying: usize,
    ) -> f64 {
        observations
            .iter()
            .map(|obs| obs.weight * self.log_prob(base, obs.repeat_count, underlying))
            .sum()
    }

    /// Maximum-likelihood underlying count and its log-probability. Every
    /// count in `0..=max_repeat_length` is tried; ties keep the smaller count.
    pub fn ml_repeat_count(&self, base: u8, observations: &[RepeatObservation]) -> (usize, f64) {
        let mut best = (0, self.log_prob_for_observations(base, observations, 0));
        for underlying in 1..=self.max_repeat_length {
            let log_prob = self.log_prob_for_observations(base, observations, underlying);
            if log_prob > best.1 {
                best = (underlying, log_prob);
            }
        }
        best
    }
}

impl Default for RepeatSubMatrix {
    fn default() -> Self {
        let params = RepeatModelParams::default();
        Self::parametric(params.max_repeat_length, params.decay, params.growth)
    }
}

/// Expand the graph reference (a run-length consensus) into an [`RleString`]
/// with maximum-likelihood repeat counts.
///
/// `rle_reads[k]` is the run-length encoding of read `k` as augmented into
/// `poa`. For each node only observations whose read symbol equals the node
/// base contribute; a node without any keeps a count of 1.
pub fn expand_rle_consensus(poa: &Poa, rle_reads: &[RleString], matrix: &RepeatSubMatrix) -> RleString {
    let reference = poa.reference();
    let mut counts = Vec::with_capacity(reference.len());
    for (i, &base) in reference.iter().enumerate() {
        let symbol = Symbol::from_base(base);
        let observations: Vec<RepeatObservation> = poa
            .node(i + 1)
            .observations
            .iter()
            .filter_map(|obs| {
                let read = &rle_reads[obs.read_no];
                (Symbol::from_base(read.as_bytes()[obs.offset]) == symbol)
                    .then(|| RepeatObservation::new(read.repeat_count(obs.offset), obs.weight))
            })
            .collect();
        if observations.is_empty() {
            counts.push(1);
        } else {
            counts.push(matrix.ml_repeat_count(base, &observations).0);
        }
    }
    RleString::from_runs(reference.to_vec(), counts)
}
