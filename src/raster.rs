//! In-memory single-band raster.

/// Row-major `f32` pixels. NaN marks no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

/// Statistics over the valid (non-NaN) pixels of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStats {
    pub valid_pixels: u64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    pub total: f64,
}

impl Raster {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        if values.len() != width as usize * height as usize {
            return None;
        }
        Some(Raster {
            width,
            height,
            values,
        })
    }

    #[cfg(test)]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Raster {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    pub fn same_shape(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Nearest-neighbour resample onto a `width` x `height` grid covering the
    /// same extent.
    pub fn resample(&self, width: u32, height: u32) -> Raster {
        if self.width == width && self.height == height {
            return self.clone();
        }

        let mut values = Vec::with_capacity(width as usize * height as usize);
        if self.values.is_empty() {
            values.resize(width as usize * height as usize, f32::NAN);
            return Raster {
                width,
                height,
                values,
            };
        }
        for row in 0..height {
            let src_row = source_index(row, height, self.height);
            for col in 0..width {
                let src_col = source_index(col, width, self.width);
                values.push(self.values[src_row * self.width as usize + src_col]);
            }
        }

        Raster {
            width,
            height,
            values,
        }
    }

    pub fn stats(&self) -> RasterStats {
        let mut valid_pixels = 0u64;
        let mut min: Option<f32> = None;
        let mut max: Option<f32> = None;
        let mut total = 0f64;

        for &v in self.values.iter().filter(|v| !v.is_nan()) {
            valid_pixels += 1;
            total += v as f64;
            min = Some(min.map_or(v, |m| m.min(v)));
            max = Some(max.map_or(v, |m| m.max(v)));
        }

        let mean = (valid_pixels > 0).then(|| total / valid_pixels as f64);

        RasterStats {
            valid_pixels,
            min,
            max,
            mean,
            total,
        }
    }
}

// Maps the centre of destination cell `i` back to a source cell.
fn source_index(i: u32, dst_len: u32, src_len: u32) -> usize {
    let centre = (i as f64 + 0.5) * src_len as f64 / dst_len as f64;
    (centre.floor() as usize).min(src_len as usize - 1)
}
