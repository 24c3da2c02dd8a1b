//! Python bindings that expose the region polisher via PyO3.
use pyo3::{exceptions::PyRuntimeError, exceptions::PyValueError, prelude::*, types::PyModule};

use crate::framework::CancellationToken;
use crate::genomics::Read;
use crate::params::PolishParams;
use crate::polish::{AlignedPair, RegionPolisher, RleString};

/// Python-facing polisher for single regions.
#[pyclass]
#[derive(Debug)]
pub struct PyPolisher {
    polisher: RegionPolisher,
}

#[pymethods]
impl PyPolisher {
    #[new]
    #[pyo3(signature = (params_json=None))]
    /// Create a polisher from a JSON parameter string, or the defaults.
    pub fn new(params_json: Option<&str>) -> PyResult<Self> {
        let params = match params_json {
            Some(json) => PolishParams::from_json_str(json)
                .map_err(|err| PyValueError::new_err(err.to_string()))?,
            None => PolishParams::default(),
        };
        let polisher =
            RegionPolisher::new(params).map_err(|err| PyValueError::new_err(err.to_string()))?;
        Ok(Self { polisher })
    }

    /// Parameters in effect, as JSON.
    pub fn params_json(&self) -> PyResult<String> {
        self.polisher
            .params()
            .to_json()
            .map_err(|err| PyRuntimeError::new_err(err.to_string()))
    }

    /// Polish `reference` with `reads`.
    ///
    /// Args:
    ///     reference: Draft sequence.
    ///     reads: Read sequences, already oriented to the draft.
    ///     alignments: Optional per-read lists of `(ref_pos, read_pos, weight)`
    ///         anchors; missing or empty lists align reads globally. Pairs
    ///         outside the reference or read raise `ValueError`.
    ///
    /// Returns:
    ///     The consensus sequence.
    #[pyo3(signature = (reference, reads, alignments=None))]
    pub fn consensus(
        &self,
        py: Python<'_>,
        reference: &str,
        reads: Vec<String>,
        alignments: Option<Vec<Vec<(usize, usize, f64)>>>,
    ) -> PyResult<String> {
        let reads: Vec<Read> = reads
            .iter()
            .enumerate()
            .map(|(k, seq)| Read::new(format!("read{k}"), seq.trim().to_ascii_uppercase()))
            .collect();
        let reference = reference.trim().to_ascii_uppercase();

        let alignments = match alignments {
            Some(alignments) if alignments.len() != reads.len() => {
                return Err(PyValueError::new_err(format!(
                    "expected {} alignment lists, got {}",
                    reads.len(),
                    alignments.len()
                )));
            }
            Some(alignments) => alignments
                .into_iter()
                .zip(&reads)
                .enumerate()
                .map(|(k, (pairs, read))| {
                    pairs
                        .into_iter()
                        .map(|(x, y, weight)| {
                            if x >= reference.len() || y >= read.len() {
                                return Err(PyValueError::new_err(format!(
                                    "read {k}: pair ({x}, {y}) outside a {}-base reference and {}-base read",
                                    reference.len(),
                                    read.len()
                                )));
                            }
                            Ok(AlignedPair::new(x, y, weight))
                        })
                        .collect::<PyResult<Vec<_>>>()
                })
                .collect::<PyResult<Vec<_>>>()?,
            None => vec![Vec::new(); reads.len()],
        };

        let region = py.allow_threads(|| {
            self.polisher
                .polish(reference.as_bytes(), &reads, &alignments, &CancellationToken::new())
        });
        Ok(String::from_utf8_lossy(&region.consensus).into_owned())
    }
}

/// Run-length encode a sequence into `(runs, counts)`.
#[pyfunction]
pub fn run_length_encode(sequence: &str) -> (String, Vec<usize>) {
    let rle = RleString::encode(sequence.as_bytes());
    (
        String::from_utf8_lossy(rle.as_bytes()).into_owned(),
        rle.repeat_counts().to_vec(),
    )
}

/// Create Python module.
#[pymodule]
pub fn rosalind_polish_py(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPolisher>()?;
    m.add_function(wrap_pyfunction!(run_length_encode, m)?)?;
    Ok(())
}
