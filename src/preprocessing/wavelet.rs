//! Separable 2-D discrete wavelet transform
//!
//! Orthogonal Daubechies filter banks with half-sample symmetric boundary
//! extension. Each analysis level produces `floor((n + filter_len - 1) / 2)`
//! samples per axis, and synthesis yields `2 * n - filter_len + 2`, which is
//! either the original length or one sample longer.

use crate::error::{MeterError, Result};
use ndarray::{s, Array2, ArrayView1, ArrayViewMut1, Axis};
use serde::Serialize;

/// Daubechies scaling (reconstruction low-pass) coefficients
const DB1: [f64; 2] = [0.7071067811865476, 0.7071067811865476];
const DB2: [f64; 4] = [
    0.48296291314469025,
    0.836516303737469,
    0.22414386804185735,
    -0.12940952255092145,
];
const DB3: [f64; 6] = [
    0.3326705529509569,
    0.8068915093133388,
    0.4598775021193313,
    -0.13501102001039084,
    -0.08544127388224149,
    0.035226291882100656,
];
const DB4: [f64; 8] = [
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

/// Wavelet family used for decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    /// Haar, the shortest Daubechies filter
    #[default]
    Db1,
    Db2,
    Db3,
    Db4,
}

impl Wavelet {
    pub const ALL: [Wavelet; 4] = [Wavelet::Db1, Wavelet::Db2, Wavelet::Db3, Wavelet::Db4];

    /// Parse a wavelet name ("db1".."db4", or "haar")
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "db1" | "haar" => Ok(Self::Db1),
            "db2" => Ok(Self::Db2),
            "db3" => Ok(Self::Db3),
            "db4" => Ok(Self::Db4),
            other => Err(MeterError::InvalidParameter(format!(
                "unsupported wavelet '{}' (expected one of db1, db2, db3, db4, haar)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Db1 => "db1",
            Self::Db2 => "db2",
            Self::Db3 => "db3",
            Self::Db4 => "db4",
        }
    }

    fn scaling(&self) -> &'static [f64] {
        match self {
            Self::Db1 => &DB1,
            Self::Db2 => &DB2,
            Self::Db3 => &DB3,
            Self::Db4 => &DB4,
        }
    }

    pub fn filter_len(&self) -> usize {
        self.scaling().len()
    }

    /// Deepest decomposition that still leaves at least one filter length of
    /// signal per level for an axis of `len` samples
    pub fn max_level(&self, len: usize) -> usize {
        let step = self.filter_len() - 1;
        (len / step).checked_ilog2().map_or(0, |level| level as usize)
    }

    fn filter_bank(&self) -> FilterBank {
        FilterBank::from_scaling(self.scaling())
    }
}

/// Detail sub-bands of a single decomposition level
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBands {
    pub horizontal: Array2<f64>,
    pub vertical: Array2<f64>,
    pub diagonal: Array2<f64>,
}

impl DetailBands {
    fn bands_mut(&mut self) -> [&mut Array2<f64>; 3] {
        [&mut self.horizontal, &mut self.vertical, &mut self.diagonal]
    }

    /// (rows, cols) shared by all three bands
    pub fn dim(&self) -> (usize, usize) {
        self.horizontal.dim()
    }
}

/// Multi-level decomposition, details ordered coarsest level first
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletCoefficients {
    pub wavelet: Wavelet,
    pub approximation: Array2<f64>,
    pub details: Vec<DetailBands>,
}

impl WaveletCoefficients {
    pub fn levels(&self) -> usize {
        self.details.len()
    }

    /// Apply `f` to every detail coefficient at every level
    pub fn map_details<F>(&mut self, f: F)
    where
        F: Fn(f64) -> f64,
    {
        for level in &mut self.details {
            for band in level.bands_mut() {
                band.mapv_inplace(&f);
            }
        }
    }
}

struct FilterBank {
    dec_lo: Vec<f64>,
    dec_hi: Vec<f64>,
    rec_lo: Vec<f64>,
    rec_hi: Vec<f64>,
}

impl FilterBank {
    fn from_scaling(scaling: &[f64]) -> Self {
        let len = scaling.len();
        let rec_lo = scaling.to_vec();
        let dec_lo: Vec<f64> = scaling.iter().rev().copied().collect();
        let dec_hi: Vec<f64> = scaling
            .iter()
            .enumerate()
            .map(|(k, &h)| if k % 2 == 0 { -h } else { h })
            .collect();
        let rec_hi: Vec<f64> = (0..len).map(|k| dec_hi[len - 1 - k]).collect();

        Self {
            dec_lo,
            dec_hi,
            rec_lo,
            rec_hi,
        }
    }

    fn len(&self) -> usize {
        self.rec_lo.len()
    }

    fn analysis_len(&self, n: usize) -> usize {
        (n + self.len() - 1) / 2
    }

    fn synthesis_len(&self, n: usize) -> usize {
        (2 * n + 2).saturating_sub(self.len())
    }

    /// Convolve with both decomposition filters and keep odd-indexed outputs
    fn analyze(
        &self,
        signal: ArrayView1<f64>,
        mut lo: ArrayViewMut1<f64>,
        mut hi: ArrayViewMut1<f64>,
    ) {
        let n = signal.len();
        for k in 0..lo.len() {
            let centre = (2 * k + 1) as isize;
            let mut acc_lo = 0.0;
            let mut acc_hi = 0.0;
            for j in 0..self.len() {
                let x = signal[symmetric_index(centre - j as isize, n)];
                acc_lo += self.dec_lo[j] * x;
                acc_hi += self.dec_hi[j] * x;
            }
            lo[k] = acc_lo;
            hi[k] = acc_hi;
        }
    }

    /// Upsample both bands, filter, and keep the valid part of the sum
    fn synthesize(
        &self,
        approx: ArrayView1<f64>,
        detail: ArrayView1<f64>,
        mut out: ArrayViewMut1<f64>,
    ) {
        let f = self.len();
        let n = approx.len();
        for m in 0..out.len() {
            let p = m + f - 2;
            let k_min = (p + 2).saturating_sub(f) / 2;
            let k_max = (p / 2).min(n - 1);
            let mut acc = 0.0;
            for k in k_min..=k_max {
                let tap = p - 2 * k;
                acc += approx[k] * self.rec_lo[tap] + detail[k] * self.rec_hi[tap];
            }
            out[m] = acc;
        }
    }
}

/// Half-sample symmetric extension: x[-1] = x[0], x[n] = x[n - 1]
fn symmetric_index(idx: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = idx.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}

fn analyze_axis(
    data: &Array2<f64>,
    axis: Axis,
    bank: &FilterBank,
) -> (Array2<f64>, Array2<f64>) {
    let (rows, cols) = data.dim();
    let shape = if axis == Axis(0) {
        (bank.analysis_len(rows), cols)
    } else {
        (rows, bank.analysis_len(cols))
    };
    let mut lo = Array2::zeros(shape);
    let mut hi = Array2::zeros(shape);

    for ((lane, lo_lane), hi_lane) in data
        .lanes(axis)
        .into_iter()
        .zip(lo.lanes_mut(axis))
        .zip(hi.lanes_mut(axis))
    {
        bank.analyze(lane, lo_lane, hi_lane);
    }

    (lo, hi)
}

fn synthesize_axis(
    lo: &Array2<f64>,
    hi: &Array2<f64>,
    axis: Axis,
    bank: &FilterBank,
) -> Result<Array2<f64>> {
    if lo.dim() != hi.dim() {
        return Err(MeterError::DimensionMismatch {
            expected: lo.dim(),
            actual: hi.dim(),
        });
    }

    let (rows, cols) = lo.dim();
    let shape = if axis == Axis(0) {
        (bank.synthesis_len(rows), cols)
    } else {
        (rows, bank.synthesis_len(cols))
    };
    let mut out = Array2::zeros(shape);

    for ((lo_lane, hi_lane), out_lane) in lo
        .lanes(axis)
        .into_iter()
        .zip(hi.lanes(axis))
        .zip(out.lanes_mut(axis))
    {
        bank.synthesize(lo_lane, hi_lane, out_lane);
    }

    Ok(out)
}

fn dwt2(data: &Array2<f64>, bank: &FilterBank) -> (Array2<f64>, DetailBands) {
    let (low_rows, high_rows) = analyze_axis(data, Axis(0), bank);
    let (approximation, vertical) = analyze_axis(&low_rows, Axis(1), bank);
    let (horizontal, diagonal) = analyze_axis(&high_rows, Axis(1), bank);

    (
        approximation,
        DetailBands {
            horizontal,
            vertical,
            diagonal,
        },
    )
}

fn idwt2(approximation: &Array2<f64>, details: &DetailBands, bank: &FilterBank) -> Result<Array2<f64>> {
    let low_rows = synthesize_axis(approximation, &details.vertical, Axis(1), bank)?;
    let high_rows = synthesize_axis(&details.horizontal, &details.diagonal, Axis(1), bank)?;
    synthesize_axis(&low_rows, &high_rows, Axis(0), bank)
}

/// Decompose `data` over `levels` levels
///
/// Fails with `InvalidParameter` when the smaller image axis cannot support
/// the requested depth.
pub fn wavedec2(data: &Array2<f64>, wavelet: Wavelet, levels: usize) -> Result<WaveletCoefficients> {
    let (rows, cols) = data.dim();
    if levels == 0 {
        return Err(MeterError::InvalidParameter(
            "decomposition levels must be at least 1".to_string(),
        ));
    }
    let max_level = wavelet.max_level(rows.min(cols));
    if levels > max_level {
        return Err(MeterError::InvalidParameter(format!(
            "{}x{} image supports at most {} {} levels, {} requested",
            cols,
            rows,
            max_level,
            wavelet.as_str(),
            levels
        )));
    }

    let bank = wavelet.filter_bank();
    let mut approximation = data.clone();
    let mut details = Vec::with_capacity(levels);
    for _ in 0..levels {
        let (next, bands) = dwt2(&approximation, &bank);
        details.push(bands);
        approximation = next;
    }
    details.reverse();

    Ok(WaveletCoefficients {
        wavelet,
        approximation,
        details,
    })
}

/// Reconstruct from a multi-level decomposition
///
/// The result may be one sample larger than the original along each axis;
/// callers crop to the size they started from.
pub fn waverec2(coeffs: &WaveletCoefficients) -> Result<Array2<f64>> {
    let bank = coeffs.wavelet.filter_bank();
    let mut approximation = coeffs.approximation.clone();

    for level in &coeffs.details {
        let (rows, cols) = level.dim();
        let (a_rows, a_cols) = approximation.dim();
        if (a_rows, a_cols) != (rows, cols) {
            // Odd-sized levels reconstruct one sample too long
            if a_rows < rows || a_cols < cols || a_rows - rows > 1 || a_cols - cols > 1 {
                return Err(MeterError::DimensionMismatch {
                    expected: (rows, cols),
                    actual: (a_rows, a_cols),
                });
            }
            approximation = approximation.slice(s![..rows, ..cols]).to_owned();
        }
        approximation = idwt2(&approximation, level, &bank)?;
    }

    Ok(approximation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 37 + c * 11) % 97) as f64)
    }

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_parse_wavelet_names() {
        assert_eq!(Wavelet::parse("db1").unwrap(), Wavelet::Db1);
        assert_eq!(Wavelet::parse("HAAR").unwrap(), Wavelet::Db1);
        assert_eq!(Wavelet::parse(" db4 ").unwrap(), Wavelet::Db4);
        assert!(matches!(
            Wavelet::parse("sym5"),
            Err(MeterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_filters_are_orthonormal() {
        for wavelet in Wavelet::ALL {
            let bank = wavelet.filter_bank();
            let energy: f64 = bank.rec_lo.iter().map(|h| h * h).sum();
            let sum: f64 = bank.rec_lo.iter().sum();
            let hi_sum: f64 = bank.dec_hi.iter().sum();
            assert!((energy - 1.0).abs() < 1e-9, "{:?} energy {}", wavelet, energy);
            assert!((sum - 2f64.sqrt()).abs() < 1e-9, "{:?} sum {}", wavelet, sum);
            assert!(hi_sum.abs() < 1e-9, "{:?} high-pass sum {}", wavelet, hi_sum);
        }
    }

    #[test]
    fn test_max_level() {
        assert_eq!(Wavelet::Db1.max_level(64), 6);
        assert_eq!(Wavelet::Db1.max_level(8), 3);
        assert_eq!(Wavelet::Db1.max_level(1), 0);
        assert_eq!(Wavelet::Db2.max_level(64), 4);
        assert_eq!(Wavelet::Db4.max_level(6), 0);
    }

    #[test]
    fn test_symmetric_index() {
        assert_eq!(symmetric_index(-1, 5), 0);
        assert_eq!(symmetric_index(-2, 5), 1);
        assert_eq!(symmetric_index(5, 5), 4);
        assert_eq!(symmetric_index(6, 5), 3);
        assert_eq!(symmetric_index(2, 5), 2);
    }

    #[test]
    fn test_subband_shapes_follow_dyadic_rule() {
        let data = pattern(37, 50);
        let coeffs = wavedec2(&data, Wavelet::Db2, 3).unwrap();
        assert_eq!(coeffs.levels(), 3);

        // finest level last: 37x50 -> 20x26 -> 11x14 -> 7x8
        assert_eq!(coeffs.details[2].dim(), (20, 26));
        assert_eq!(coeffs.details[1].dim(), (11, 14));
        assert_eq!(coeffs.details[0].dim(), (7, 8));
        assert_eq!(coeffs.approximation.dim(), (7, 8));
        for level in &coeffs.details {
            assert_eq!(level.vertical.dim(), level.horizontal.dim());
            assert_eq!(level.diagonal.dim(), level.horizontal.dim());
        }
    }

    #[test]
    fn test_haar_constant_image() {
        let data = Array2::from_elem((9, 12), 10.0);
        let coeffs = wavedec2(&data, Wavelet::Db1, 2).unwrap();

        for value in coeffs.approximation.iter() {
            assert!((value - 40.0).abs() < 1e-9);
        }
        for level in &coeffs.details {
            for value in level
                .horizontal
                .iter()
                .chain(level.vertical.iter())
                .chain(level.diagonal.iter())
            {
                assert!(value.abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_perfect_reconstruction() {
        for wavelet in Wavelet::ALL {
            for (rows, cols) in [(32, 32), (33, 47), (40, 29)] {
                let data = pattern(rows, cols);
                let coeffs = wavedec2(&data, wavelet, 2).unwrap();
                let restored = waverec2(&coeffs).unwrap();
                assert!(restored.nrows() >= rows && restored.ncols() >= cols);

                let cropped = restored.slice(s![..rows, ..cols]).to_owned();
                let err = max_abs_diff(&cropped, &data);
                assert!(err < 1e-6, "{:?} {}x{} error {}", wavelet, rows, cols, err);
            }
        }
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let data = pattern(8, 8);
        assert!(wavedec2(&data, Wavelet::Db1, 3).is_ok());
        assert!(matches!(
            wavedec2(&data, Wavelet::Db1, 4),
            Err(MeterError::InvalidParameter(_))
        ));
        assert!(matches!(
            wavedec2(&data, Wavelet::Db1, 0),
            Err(MeterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_map_details_leaves_approximation() {
        let data = pattern(16, 16);
        let mut coeffs = wavedec2(&data, Wavelet::Db1, 2).unwrap();
        let approximation = coeffs.approximation.clone();
        coeffs.map_details(|_| 0.0);

        assert_eq!(coeffs.approximation, approximation);
        assert!(coeffs
            .details
            .iter()
            .all(|level| level.diagonal.iter().all(|&v| v == 0.0)));
    }
}
