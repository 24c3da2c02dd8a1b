//! Banded pair-HMM alignment of a read to a reference.
//!
//! The model has three states: match (reference base aligned to read base),
//! delete (reference base aligned to a gap) and insert (read base aligned to a
//! gap). Forward/backward are run in log space over a band, giving the
//! posterior probability of every aligned pair, the log-likelihood of the
//! read given the reference, and maximal-expected-accuracy alignments.

use crate::params::AlignmentParams;
use crate::polish::symbol::Symbol;

const NEG_INF: f64 = f64::NEG_INFINITY;

/// Pair of coordinates with a weight.
///
/// `x` indexes the reference, `y` the read. For a match `x` is aligned to
/// `y`. For an insert, read position `y` sits immediately before reference
/// position `x`. For a delete, reference position `x` is skipped and `y` is
/// the next read position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPair {
    /// Reference coordinate.
    pub x: usize,
    /// Read coordinate.
    pub y: usize,
    /// Posterior probability or confidence of the pair.
    pub weight: f64,
}

impl AlignedPair {
    /// Construct a pair.
    pub fn new(x: usize, y: usize, weight: f64) -> Self {
        Self { x, y, weight }
    }
}

/// Posterior-weighted aligned pairs of one read against one reference.
#[derive(Debug, Clone, Default)]
pub struct AlignmentPosteriors {
    /// Match pairs above the posterior threshold.
    pub matches: Vec<AlignedPair>,
    /// Insert pairs above the posterior threshold.
    pub inserts: Vec<AlignedPair>,
    /// Delete pairs above the posterior threshold.
    pub deletes: Vec<AlignedPair>,
    /// Log-likelihood of the aligned part of the read given the reference.
    pub log_likelihood: f64,
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == NEG_INF {
        return b;
    }
    if b == NEG_INF {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

fn log_add3(a: f64, b: f64, c: f64) -> f64 {
    log_add(log_add(a, b), c)
}

/// Log-space transition and emission probabilities.
#[derive(Debug, Clone, Copy)]
struct Model {
    match_to_match: f64,
    match_to_gap: f64,
    gap_to_gap: f64,
    gap_to_match: f64,
    emit_same: f64,
    emit_different: f64,
    emit_uniform: f64,
}

impl Model {
    fn new(params: &AlignmentParams) -> Self {
        let substitution = params.substitution_rate.clamp(1e-9, 1.0 - 1e-9);
        Self {
            match_to_match: (1.0 - 2.0 * params.gap_open).ln(),
            match_to_gap: params.gap_open.ln(),
            gap_to_gap: params.gap_extend.ln(),
            gap_to_match: (1.0 - params.gap_extend).ln(),
            emit_same: (1.0 - substitution).ln(),
            emit_different: (substitution / 3.0).ln(),
            emit_uniform: 0.25f64.ln(),
        }
    }

    fn match_emission(&self, reference: u8, read: u8) -> f64 {
        let (x, y) = (Symbol::from_base(reference), Symbol::from_base(read));
        if x == Symbol::N || y == Symbol::N {
            self.emit_uniform
        } else if x == y {
            self.emit_same
        } else {
            self.emit_different
        }
    }
}

/// Allowed read columns `lo[i]..=hi[i]` for every reference row `i` of the DP.
#[derive(Debug, Clone)]
struct Band {
    lo: Vec<usize>,
    hi: Vec<usize>,
    offsets: Vec<usize>,
    cells: usize,
}

impl Band {
    fn full(rows: usize, cols: usize) -> Self {
        Self::from_bounds(vec![0; rows + 1], vec![cols; rows + 1])
    }

    /// Band around the piecewise-linear path through `points` (DP coordinates,
    /// first `(0, 0)`, last `(rows, cols)`).
    fn around_path(rows: usize, cols: usize, points: &[(usize, usize)], width: usize) -> Self {
        let mut lo = vec![usize::MAX; rows + 1];
        let mut hi = vec![0usize; rows + 1];

        for segment in points.windows(2) {
            let (a, b) = (segment[0], segment[1]);
            let di = (b.0 - a.0) as f64;
            let dj = b.1 as f64 - a.1 as f64;
            let center = |i: usize| -> usize {
                let t = (i.min(b.0) - a.0) as f64 / di;
                (a.1 as f64 + t * dj).round().max(0.0) as usize
            };
            for i in a.0..=b.0 {
                let c0 = center(i);
                let c1 = center(i + 1);
                lo[i] = lo[i].min(c0.min(c1).saturating_sub(width));
                hi[i] = hi[i].max(c0.max(c1) + width);
            }
        }

        for i in 0..=rows {
            hi[i] = hi[i].min(cols);
            lo[i] = lo[i].min(hi[i]);
        }
        lo[0] = 0;
        hi[rows] = cols;
        for i in 1..=rows {
            hi[i] = hi[i].max(hi[i - 1]);
            lo[i] = lo[i].max(lo[i - 1]).min(hi[i - 1] + 1).min(cols);
            hi[i] = hi[i].max(lo[i]);
        }

        Self::from_bounds(lo, hi)
    }

    fn from_bounds(lo: Vec<usize>, hi: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(lo.len());
        let mut cells = 0;
        for (l, h) in lo.iter().zip(&hi) {
            offsets.push(cells);
            cells += h - l + 1;
        }
        Self {
            lo,
            hi,
            offsets,
            cells,
        }
    }

    fn rows(&self) -> usize {
        self.lo.len() - 1
    }

    fn index(&self, i: usize, j: usize) -> Option<usize> {
        if i >= self.lo.len() || j < self.lo[i] || j > self.hi[i] {
            return None;
        }
        Some(self.offsets[i] + j - self.lo[i])
    }
}

/// The part of the read and reference actually aligned, plus its band.
struct Problem<'a> {
    reference: &'a [u8],
    read: &'a [u8],
    x_offset: usize,
    y_offset: usize,
    band: Band,
}

impl<'a> Problem<'a> {
    fn new(
        reference: &'a [u8],
        read: &'a [u8],
        anchors: Option<&[AlignedPair]>,
        width: usize,
    ) -> Self {
        let mut usable: Vec<(usize, usize)> = Vec::new();
        for pair in anchors.unwrap_or(&[]) {
            if pair.x >= reference.len() || pair.y >= read.len() {
                continue;
            }
            if let Some(&(px, py)) = usable.last() {
                if pair.x <= px || pair.y <= py {
                    continue;
                }
            }
            usable.push((pair.x, pair.y));
        }

        match (usable.first().copied(), usable.last().copied()) {
            (Some((x0, y0)), Some((x1, y1))) => {
                let reference = &reference[x0..=x1];
                let read = &read[y0..=y1];
                let (rows, cols) = (reference.len(), read.len());
                let mut points = Vec::with_capacity(usable.len() + 1);
                points.push((0, 0));
                points.extend(usable.iter().map(|&(x, y)| (x - x0 + 1, y - y0 + 1)));
                Self {
                    reference,
                    read,
                    x_offset: x0,
                    y_offset: y0,
                    band: Band::around_path(rows, cols, &points, width),
                }
            }
            _ => Self {
                reference,
                read,
                x_offset: 0,
                y_offset: 0,
                band: Band::full(reference.len(), read.len()),
            },
        }
    }

    fn is_empty(&self) -> bool {
        self.reference.is_empty() || self.read.is_empty()
    }
}

/// Per-state log values over the band.
struct StateMatrices {
    matched: Vec<f64>,
    deleted: Vec<f64>,
    inserted: Vec<f64>,
}

impl StateMatrices {
    fn new(cells: usize) -> Self {
        Self {
            matched: vec![NEG_INF; cells],
            deleted: vec![NEG_INF; cells],
            inserted: vec![NEG_INF; cells],
        }
    }
}

fn forward(problem: &Problem<'_>, model: &Model) -> (StateMatrices, f64) {
    let band = &problem.band;
    let mut f = StateMatrices::new(band.cells);

    for i in 0..=band.rows() {
        for j in band.lo[i]..=band.hi[i] {
            let idx = band.offsets[i] + j - band.lo[i];
            if i == 0 && j == 0 {
                f.matched[idx] = 0.0;
                continue;
            }
            if i > 0 && j > 0 {
                if let Some(d) = band.index(i - 1, j - 1) {
                    f.matched[idx] = model
                        .match_emission(problem.reference[i - 1], problem.read[j - 1])
                        + log_add3(
                            f.matched[d] + model.match_to_match,
                            f.deleted[d] + model.gap_to_match,
                            f.inserted[d] + model.gap_to_match,
                        );
                }
            }
            if i > 0 {
                if let Some(u) = band.index(i - 1, j) {
                    f.deleted[idx] = log_add(
                        f.matched[u] + model.match_to_gap,
                        f.deleted[u] + model.gap_to_gap,
                    );
                }
            }
            if j > 0 {
                if let Some(l) = band.index(i, j - 1) {
                    f.inserted[idx] = model.emit_uniform
                        + log_add(
                            f.matched[l] + model.match_to_gap,
                            f.inserted[l] + model.gap_to_gap,
                        );
                }
            }
        }
    }

    let end = band.cells - 1;
    let total = log_add3(f.matched[end], f.deleted[end], f.inserted[end]);
    (f, total)
}

fn backward(problem: &Problem<'_>, model: &Model) -> StateMatrices {
    let band = &problem.band;
    let rows = band.rows();
    let cols = problem.read.len();
    let mut b = StateMatrices::new(band.cells);

    for i in (0..=rows).rev() {
        for j in (band.lo[i]..=band.hi[i]).rev() {
            let idx = band.offsets[i] + j - band.lo[i];
            if i == rows && j == cols {
                b.matched[idx] = 0.0;
                b.deleted[idx] = 0.0;
                b.inserted[idx] = 0.0;
                continue;
            }
            let diagonal = if i < rows && j < cols {
                band.index(i + 1, j + 1).map_or(NEG_INF, |d| {
                    model.match_emission(problem.reference[i], problem.read[j]) + b.matched[d]
                })
            } else {
                NEG_INF
            };
            let down = if i < rows {
                band.index(i + 1, j).map_or(NEG_INF, |d| b.deleted[d])
            } else {
                NEG_INF
            };
            let right = if j < cols {
                band.index(i, j + 1)
                    .map_or(NEG_INF, |r| model.emit_uniform + b.inserted[r])
            } else {
                NEG_INF
            };
            b.matched[idx] = log_add3(
                model.match_to_match + diagonal,
                model.match_to_gap + down,
                model.match_to_gap + right,
            );
            b.deleted[idx] = log_add(model.gap_to_match + diagonal, model.gap_to_gap + down);
            b.inserted[idx] = log_add(model.gap_to_match + diagonal, model.gap_to_gap + right);
        }
    }
    b
}

/// Posterior match/insert/delete pairs of `read` against `reference`.
///
/// With anchors the alignment is restricted to the span between the first
/// and last usable anchor and to a band around the anchored path; without
/// anchors the whole matrix is explored.
pub fn posteriors(
    reference: &[u8],
    read: &[u8],
    anchors: Option<&[AlignedPair]>,
    params: &AlignmentParams,
) -> AlignmentPosteriors {
    let problem = Problem::new(reference, read, anchors, params.band_width);
    if problem.is_empty() {
        return AlignmentPosteriors::default();
    }
    let model = Model::new(params);
    let (f, total) = forward(&problem, &model);
    let b = backward(&problem, &model);
    let band = &problem.band;

    let mut result = AlignmentPosteriors {
        log_likelihood: total,
        ..Default::default()
    };
    for i in 0..=band.rows() {
        for j in band.lo[i]..=band.hi[i] {
            let idx = band.offsets[i] + j - band.lo[i];
            if i > 0 && j > 0 {
                let p = (f.matched[idx] + b.matched[idx] - total).exp();
                if p >= params.min_posterior {
                    result.matches.push(AlignedPair::new(
                        problem.x_offset + i - 1,
                        problem.y_offset + j - 1,
                        p.min(1.0),
                    ));
                }
            }
            if i > 0 {
                let p = (f.deleted[idx] + b.deleted[idx] - total).exp();
                if p >= params.min_posterior {
                    result.deletes.push(AlignedPair::new(
                        problem.x_offset + i - 1,
                        problem.y_offset + j,
                        p.min(1.0),
                    ));
                }
            }
            if j > 0 {
                let p = (f.inserted[idx] + b.inserted[idx] - total).exp();
                if p >= params.min_posterior {
                    result.inserts.push(AlignedPair::new(
                        problem.x_offset + i,
                        problem.y_offset + j - 1,
                        p.min(1.0),
                    ));
                }
            }
        }
    }
    result
}

/// Log-likelihood of the read given the reference (forward algorithm only).
pub fn log_likelihood(
    reference: &[u8],
    read: &[u8],
    anchors: Option<&[AlignedPair]>,
    params: &AlignmentParams,
) -> f64 {
    let problem = Problem::new(reference, read, anchors, params.band_width);
    if problem.is_empty() {
        return 0.0;
    }
    forward(&problem, &Model::new(params)).1
}

const STOP: u8 = 0;
const DIAGONAL: u8 = 1;
const UP: u8 = 2;
const LEFT: u8 = 3;

/// Maximal-expected-accuracy alignment: the monotone set of match pairs with
/// the largest summed posterior. Pairs below `min_posterior` are never used.
pub fn mea_alignment(
    reference: &[u8],
    read: &[u8],
    anchors: Option<&[AlignedPair]>,
    params: &AlignmentParams,
) -> Vec<AlignedPair> {
    let problem = Problem::new(reference, read, anchors, params.band_width);
    if problem.is_empty() {
        return Vec::new();
    }
    let model = Model::new(params);
    let (f, total) = forward(&problem, &model);
    let b = backward(&problem, &model);
    let band = &problem.band;

    let mut score = vec![0.0f64; band.cells];
    let mut trace = vec![STOP; band.cells];
    let mut posterior = vec![0.0f64; band.cells];

    for i in 0..=band.rows() {
        for j in band.lo[i]..=band.hi[i] {
            let idx = band.offsets[i] + j - band.lo[i];
            if i == 0 || j == 0 {
                trace[idx] = if i > 0 {
                    UP
                } else if j > 0 {
                    LEFT
                } else {
                    STOP
                };
                continue;
            }
            let p = (f.matched[idx] + b.matched[idx] - total).exp().min(1.0);
            posterior[idx] = p;

            let mut best = (NEG_INF, STOP);
            if p >= params.min_posterior {
                if let Some(d) = band.index(i - 1, j - 1) {
                    best = (score[d] + p, DIAGONAL);
                }
            }
            if let Some(u) = band.index(i - 1, j) {
                if score[u] > best.0 {
                    best = (score[u], UP);
                }
            }
            if let Some(l) = band.index(i, j - 1) {
                if score[l] > best.0 {
                    best = (score[l], LEFT);
                }
            }
            score[idx] = best.0;
            trace[idx] = best.1;
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (band.rows(), problem.read.len());
    loop {
        let Some(idx) = band.index(i, j) else {
            break;
        };
        match trace[idx] {
            DIAGONAL => {
                pairs.push(AlignedPair::new(
                    problem.x_offset + i - 1,
                    problem.y_offset + j - 1,
                    posterior[idx],
                ));
                i -= 1;
                j -= 1;
            }
            UP => i -= 1,
            LEFT => j -= 1,
            _ => break,
        }
    }
    pairs.reverse();
    pairs
}
