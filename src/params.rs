//! Run parameters for polishing.
//!
//! Parameters are plain serde structs so a run can be configured from a JSON
//! file; every field has a default, so a partial file only overrides what it
//! names.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The parameter file could not be read.
    #[error("failed to read parameter file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The parameter file is not valid JSON for [`PolishParams`].
    #[error("failed to parse parameters: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its valid range.
    #[error("invalid parameter {name}: {reason}")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ParamsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ParamsError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Pair-HMM parameters used when aligning reads to a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    /// Probability that an aligned read base differs from the reference base.
    pub substitution_rate: f64,
    /// Probability of leaving the match state for each gap state.
    pub gap_open: f64,
    /// Probability of staying in a gap state.
    pub gap_extend: f64,
    /// Half-width of the band drawn around anchor alignments.
    pub band_width: usize,
    /// Posterior below which aligned pairs are discarded.
    pub min_posterior: f64,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            substitution_rate: 0.05,
            gap_open: 0.03,
            gap_extend: 0.4,
            band_width: 25,
            min_posterior: 0.01,
        }
    }
}

/// Explicit log-probability table for one base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatTable {
    /// Base the table applies to (`A`, `C`, `G`, `T` or `N`).
    pub base: char,
    /// `log_probabilities[observed][underlying]`.
    pub log_probabilities: Vec<Vec<f64>>,
}

/// Parameters of the repeat-count model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatModelParams {
    /// Largest repeat count represented; larger counts are clamped.
    pub max_repeat_length: usize,
    /// Rate of the geometric decay around the underlying count.
    pub decay: f64,
    /// How quickly the spread widens with the underlying count.
    pub growth: f64,
    /// Optional per-base tables replacing the parametric model.
    pub tables: Vec<RepeatTable>,
}

impl Default for RepeatModelParams {
    fn default() -> Self {
        Self {
            max_repeat_length: 50,
            decay: 1.0,
            growth: 0.1,
            tables: Vec::new(),
        }
    }
}

/// Parameter object for the polish algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolishParams {
    /// Build graphs in run-length space and expand with the repeat model.
    pub use_run_length_encoding: bool,
    /// Weight subtracted from the reference base when picking a consensus base.
    pub reference_base_penalty: f64,
    /// Observation weight above which a pair becomes an anchor for the next pass.
    pub min_posterior_prob_for_alignment_anchor: f64,
    /// Fraction of local coverage an insert must exceed to enter the consensus.
    pub indel_significance_threshold: f64,
    /// Cap on consensus/realignment rounds.
    pub max_realignment_iterations: usize,
    /// Run the greedy indel check after iterative realignment.
    pub greedy_indel_edits: bool,
    /// Cap on accepted greedy edits.
    pub max_greedy_edits: usize,
    /// Fraction of local coverage an indel needs to be tried greedily.
    pub greedy_candidate_fraction: f64,
    /// Reference bases per chunk.
    pub chunk_size: usize,
    /// Bases added on each side of a chunk to seed its graph.
    pub chunk_boundary: usize,
    /// Count soft-clipped bases toward read extents.
    pub include_soft_clip: bool,
    /// Pairwise alignment model.
    pub alignment: AlignmentParams,
    /// Repeat-count model.
    pub repeat_model: RepeatModelParams,
}

impl Default for PolishParams {
    fn default() -> Self {
        Self {
            use_run_length_encoding: false,
            reference_base_penalty: 0.5,
            min_posterior_prob_for_alignment_anchor: 0.9,
            indel_significance_threshold: 0.5,
            max_realignment_iterations: 10,
            greedy_indel_edits: true,
            max_greedy_edits: 8,
            greedy_candidate_fraction: 0.2,
            chunk_size: 10_000,
            chunk_boundary: 1_000,
            include_soft_clip: false,
            alignment: AlignmentParams::default(),
            repeat_model: RepeatModelParams::default(),
        }
    }
}

impl PolishParams {
    /// Parse and validate parameters from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ParamsError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Read, parse and validate a JSON parameter file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ParamsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Enable or disable run-length encoding.
    pub fn with_run_length_encoding(mut self, enabled: bool) -> Self {
        self.use_run_length_encoding = enabled;
        self
    }

    /// Set chunk size and boundary.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_boundary: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_boundary = chunk_boundary;
        self
    }

    /// Enable or disable the greedy indel check.
    pub fn with_greedy_indel_edits(mut self, enabled: bool) -> Self {
        self.greedy_indel_edits = enabled;
        self
    }

    /// Set the realignment iteration cap.
    pub fn with_max_realignment_iterations(mut self, iterations: usize) -> Self {
        self.max_realignment_iterations = iterations;
        self
    }

    /// Check every value is inside its valid range.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let probability = |name: &'static str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ParamsError::invalid(name, format!("{value} is not in [0, 1]")))
            }
        };

        if self.reference_base_penalty < 0.0 {
            return Err(ParamsError::invalid(
                "reference_base_penalty",
                "must be non-negative",
            ));
        }
        probability(
            "min_posterior_prob_for_alignment_anchor",
            self.min_posterior_prob_for_alignment_anchor,
        )?;
        probability("indel_significance_threshold", self.indel_significance_threshold)?;
        probability("greedy_candidate_fraction", self.greedy_candidate_fraction)?;
        if self.max_realignment_iterations == 0 {
            return Err(ParamsError::invalid("max_realignment_iterations", "must be > 0"));
        }
        if self.chunk_size == 0 {
            return Err(ParamsError::invalid("chunk_size", "must be > 0"));
        }

        let alignment = &self.alignment;
        probability("alignment.substitution_rate", alignment.substitution_rate)?;
        probability("alignment.min_posterior", alignment.min_posterior)?;
        if !(alignment.gap_open > 0.0 && alignment.gap_open < 0.5) {
            return Err(ParamsError::invalid(
                "alignment.gap_open",
                format!("{} is not in (0, 0.5)", alignment.gap_open),
            ));
        }
        if !(alignment.gap_extend > 0.0 && alignment.gap_extend < 1.0) {
            return Err(ParamsError::invalid(
                "alignment.gap_extend",
                format!("{} is not in (0, 1)", alignment.gap_extend),
            ));
        }

        let model = &self.repeat_model;
        if model.max_repeat_length == 0 {
            return Err(ParamsError::invalid("repeat_model.max_repeat_length", "must be > 0"));
        }
        if model.decay <= 0.0 || model.growth < 0.0 {
            return Err(ParamsError::invalid(
                "repeat_model",
                "decay must be > 0 and growth >= 0",
            ));
        }
        let width = model.max_repeat_length + 1;
        for table in &model.tables {
            if !"ACGTN".contains(table.base.to_ascii_uppercase()) {
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
        }
        Ok(())
    }
}

impl fmt::Display for PolishParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Polish parameters:")?;
        writeln!(f, "\tuse_run_length_encoding: {}", self.use_run_length_encoding)?;
        writeln!(f, "\treference_base_penalty: {}", self.reference_base_penalty)?;
        writeln!(
            f,
            "\tmin_posterior_prob_for_alignment_anchor: {}",
            self.min_posterior_prob_for_alignment_anchor
        )?;
        writeln!(f, "\tindel_significance_threshold: {}", self.indel_significance_threshold)?;
        writeln!(f, "\tmax_realignment_iterations: {}", self.max_realignment_iterations)?;
        writeln!(
            f,
            "\tgreedy_indel_edits: {} (max {}, candidate fraction {})",
            self.greedy_indel_edits, self.max_greedy_edits, self.greedy_candidate_fraction
        )?;
        writeln!(
            f,
            "\tchunking: size {} boundary {} soft clips {}",
            self.chunk_size, self.chunk_boundary, self.include_soft_clip
        )?;
        writeln!(
            f,
            "\talignment: substitution {} gap open {} gap extend {} band {} min posterior {}",
            self.alignment.substitution_rate,
            self.alignment.gap_open,
            self.alignment.gap_extend,
            self.alignment.band_width,
            self.alignment.min_posterior
        )?;
        write!(
            f,
            "\trepeat model: max repeat {} decay {} growth {} explicit tables {}",
            self.repeat_model.max_repeat_length,
            self.repeat_model.decay,
            self.repeat_model.growth,
            self.repeat_model.tables.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PolishParams::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let params = PolishParams::from_json_str(
            r#"{ "use_run_length_encoding": true, "alignment": { "band_width": 40 } }"#,
        )
        .expect("parse succeeds");
        assert!(params.use_run_length_encoding);
        assert_eq!(params.alignment.band_width, 40);
        assert_eq!(params.alignment.gap_extend, AlignmentParams::default().gap_extend);
        assert_eq!(params.chunk_size, PolishParams::default().chunk_size);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = PolishParams::from_json_str(r#"{ "indel_significance_threshold": 1.5 }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ParamsError::Invalid {
                name: "indel_significance_threshold",
                ..
            }
        ));

        let err = PolishParams::default().with_chunking(0, 10).validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn repeat_tables_must_be_square() {
        let mut params = PolishParams::default();
        params.repeat_model.max_repeat_length = 2;
        params.repeat_model.tables.push(RepeatTable {
            base: 'A',
            log_probabilities: vec![vec![0.0; 3]; 2],
        });
        assert!(params.validate().is_err());
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let params = PolishParams::default().with_run_length_encoding(true);
        let json = params.to_json().expect("serialize");
        assert_eq!(PolishParams::from_json_str(&json).expect("parse"), params);
    }
}
