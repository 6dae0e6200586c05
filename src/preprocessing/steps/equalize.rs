use crate::error::{MeterError, Result};
use image::{GrayImage, Luma};

/// Default clip limit, as a fraction of a region's pixel count
pub const DEFAULT_CLIP_LIMIT: f64 = 0.03;
/// Default number of contextual regions along each axis
pub const DEFAULT_GRID: u32 = 8;
/// Default histogram resolution
pub const DEFAULT_NBINS: usize = 256;

/// Contrast limited adaptive histogram equalization parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EqualizeParams {
    pub clip_limit: f64,
    /// Contextual regions as (columns, rows)
    pub grid: (u32, u32),
    pub nbins: usize,
}

impl Default for EqualizeParams {
    fn default() -> Self {
        Self {
            clip_limit: DEFAULT_CLIP_LIMIT,
            grid: (DEFAULT_GRID, DEFAULT_GRID),
            nbins: DEFAULT_NBINS,
        }
    }
}

impl EqualizeParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.clip_limit > 0.0 && self.clip_limit <= 1.0) {
            return Err(MeterError::InvalidParameter(format!(
                "clip limit must be in (0, 1], got {}",
                self.clip_limit
            )));
        }
        if self.grid.0 == 0 || self.grid.1 == 0 {
            return Err(MeterError::InvalidParameter(format!(
                "equalization grid must be at least 1x1, got {}x{}",
                self.grid.0, self.grid.1
            )));
        }
        if self.nbins < 2 {
            return Err(MeterError::InvalidParameter(format!(
                "equalization needs at least 2 histogram bins, got {}",
                self.nbins
            )));
        }
        Ok(())
    }
}

/// Pipeline step wrapper around [`equalize_adaptive`]
pub fn apply(image: GrayImage, params: &EqualizeParams) -> Result<GrayImage> {
    equalize_adaptive(&image, params)
}

/// Contrast limited adaptive histogram equalization
///
/// Intensities are stretched into a [0, 1] working range, equalized per
/// contextual region with clipped histograms, blended bilinearly between
/// neighbouring regions, then rescaled to the full [0, 255] range.
/// Flat images are returned unchanged.
pub fn equalize_adaptive(image: &GrayImage, params: &EqualizeParams) -> Result<GrayImage> {
    params.validate()?;

    let (width, height) = image.dimensions();
    let (min_val, max_val) = find_min_max(image);
    if width == 0 || height == 0 || max_val <= min_val {
        return Ok(image.clone());
    }

    let bins = quantize(image, min_val, max_val, params.nbins);
    let regions = RegionMaps::build(&bins, width, height, params);

    let mut mapped = Vec::with_capacity(bins.len());
    for y in 0..height as usize {
        for x in 0..width as usize {
            mapped.push(regions.lookup(x, y, bins[y * width as usize + x]));
        }
    }

    let lo = mapped.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = mapped.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    tracing::debug!(
        "Equalized {}x{} image over {}x{} regions (clip limit {})",
        width,
        height,
        regions.tiles_x,
        regions.tiles_y,
        params.clip_limit
    );

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let value = mapped[y as usize * width as usize + x as usize];
        let unit = if span > 0.0 { (value - lo) / span } else { value };
        Luma([(unit * 255.0).round().clamp(0.0, 255.0) as u8])
    }))
}

fn find_min_max(img: &GrayImage) -> (u8, u8) {
    let mut min = 255u8;
    let mut max = 0u8;

    for pixel in img.pixels() {
        let val = pixel.0[0];
        min = min.min(val);
        max = max.max(val);
    }

    (min, max)
}

/// Histogram bin of every pixel after stretching [min, max] onto [0, nbins - 1]
fn quantize(image: &GrayImage, min_val: u8, max_val: u8, nbins: usize) -> Vec<usize> {
    let range = (max_val - min_val) as f64;
    image
        .pixels()
        .map(|p| {
            let level = (p.0[0] - min_val) as f64 / range;
            (level * (nbins - 1) as f64).round() as usize
        })
        .collect()
}

/// Clipped lookup table of every contextual region plus the bilinear
/// weights tying each pixel to its four nearest region centres
///
/// A pixel's weights depend only on its position, and every table is
/// non-decreasing, so at a fixed position a higher bin never maps lower.
/// Two pixels of the same region blend the tables with different weights
/// and can therefore swap order.
struct RegionMaps {
    tiles_x: u32,
    tiles_y: u32,
    maps: Vec<Vec<f64>>,
    cols: Vec<(usize, usize, f64)>,
    rows: Vec<(usize, usize, f64)>,
}

impl RegionMaps {
    fn build(bins: &[usize], width: u32, height: u32, params: &EqualizeParams) -> Self {
        let tiles_x = params.grid.0.min(width);
        let tiles_y = params.grid.1.min(height);

        let mut maps = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            let (y0, y1) = tile_span(ty, tiles_y, height);
            for tx in 0..tiles_x {
                let (x0, x1) = tile_span(tx, tiles_x, width);
                let mut hist = vec![0usize; params.nbins];
                for y in y0..y1 {
                    let row = y as usize * width as usize;
                    for x in x0..x1 {
                        hist[bins[row + x as usize]] += 1;
                    }
                }
                let region_pixels = ((x1 - x0) * (y1 - y0)) as usize;
                let limit = ((params.clip_limit * region_pixels as f64) as usize).max(1);
                clip_histogram(&mut hist, limit);
                maps.push(cumulative_map(&hist, region_pixels));
            }
        }

        Self {
            tiles_x,
            tiles_y,
            maps,
            cols: interpolation_weights(width, tiles_x),
            rows: interpolation_weights(height, tiles_y),
        }
    }

    fn lookup(&self, x: usize, y: usize, bin: usize) -> f64 {
        let (tx0, tx1, wx) = self.cols[x];
        let (ty0, ty1, wy) = self.rows[y];
        let stride = self.tiles_x as usize;
        let map = |tx: usize, ty: usize| self.maps[ty * stride + tx][bin];

        let top = (1.0 - wx) * map(tx0, ty0) + wx * map(tx1, ty0);
        let bottom = (1.0 - wx) * map(tx0, ty1) + wx * map(tx1, ty1);
        (1.0 - wy) * top + wy * bottom
    }
}

/// Half-open pixel range covered by region `index` of `count` along `len`
fn tile_span(index: u32, count: u32, len: u32) -> (u32, u32) {
    let start = (index as u64 * len as u64 / count as u64) as u32;
    let end = ((index as u64 + 1) * len as u64 / count as u64) as u32;
    (start, end)
}

/// Cap every bin at `limit` and spread the excess evenly over all bins
fn clip_histogram(hist: &mut [usize], limit: usize) {
    let excess: usize = hist.iter().map(|&count| count.saturating_sub(limit)).sum();
    if excess == 0 {
        return;
    }

    for count in hist.iter_mut() {
        *count = (*count).min(limit);
    }

    let nbins = hist.len();
    let per_bin = excess / nbins;
    let remainder = excess % nbins;
    for count in hist.iter_mut() {
        *count += per_bin;
    }
    if remainder > 0 {
        let step = (nbins / remainder).max(1);
        for i in (0..nbins).step_by(step).take(remainder) {
            hist[i] += 1;
        }
    }
}

/// Monotone lookup table from bin index to [0, 1]
fn cumulative_map(hist: &[usize], total: usize) -> Vec<f64> {
    let mut running = 0usize;
    hist.iter()
        .map(|&count| {
            running += count;
            (running as f64 / total as f64).min(1.0)
        })
        .collect()
}

/// For each pixel along an axis: the two nearest region indices and the
/// weight of the second, measured between region centres
fn interpolation_weights(len: u32, tiles: u32) -> Vec<(usize, usize, f64)> {
    let centres: Vec<f64> = (0..tiles)
        .map(|t| {
            let (start, end) = tile_span(t, tiles, len);
            (start + end - 1) as f64 / 2.0
        })
        .collect();
    let last = centres.len() - 1;

    (0..len)
        .map(|p| {
            let p = p as f64;
            if p <= centres[0] {
                (0, 0, 0.0)
            } else if p >= centres[last] {
                (last, last, 0.0)
            } else {
                let i = centres.partition_point(|&c| c <= p) - 1;
                let weight = (p - centres[i]) / (centres[i + 1] - centres[i]);
                (i, i + 1, weight)
            }
        })
        .collect()
}
