//! Block sampling: reduces each cell's source-pixel block to aggregate
//! statistics.

use image::{Rgb, RgbaImage};

use crate::error::ConfigError;
use crate::field::ScalarField;

/// Number of glyph columns and rows in the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub columns: u32,
    pub rows: u32,
}

impl GridSize {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Fits the grid to the source aspect ratio.
    ///
    /// Rows are derived from the requested column count, correcting for the
    /// glyph footprint (`cell_w / cell_h`). If that needs more rows than
    /// requested, rows are clamped and columns re-derived from them instead.
    pub fn fit_aspect(self, src_w: u32, src_h: u32, cell_w: u32, cell_h: u32) -> Self {
        if src_w == 0 || src_h == 0 || cell_w == 0 || cell_h == 0 {
            return self;
        }
        let cell_ratio = cell_w as f32 / cell_h as f32;
        let src_ratio = src_h as f32 / src_w as f32;

        let rows = (src_ratio * self.columns as f32 * cell_ratio).round() as u32;
        if rows <= self.rows {
            return Self::new(self.columns, rows.max(1));
        }

        let columns = (self.rows as f32 / src_ratio / cell_ratio).round() as u32;
        Self::new(columns.clamp(1, self.columns.max(1)), self.rows)
    }

    /// Integer sampling steps for a source of the given size.
    pub fn steps(self, src_w: u32, src_h: u32) -> Result<(u32, u32), ConfigError> {
        if self.columns == 0 || self.rows == 0 {
            return Err(ConfigError::ZeroDimension {
                columns: self.columns,
                rows: self.rows,
            });
        }
        let step_x = src_w / self.columns;
        let step_y = src_h / self.rows;
        if step_x == 0 || step_y == 0 {
            return Err(ConfigError::GridExceedsSource {
                columns: self.columns,
                rows: self.rows,
                width: src_w,
                height: src_h,
            });
        }
        Ok((step_x, step_y))
    }

    pub fn cell_count(self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

/// Aggregates for one cell's block of source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStats {
    pub luminance: f32,
    /// Mean normalized edge strength, or 0 when edges were not computed.
    pub edge: f32,
    pub color: Rgb<u8>,
    /// Every pixel in the block is exactly pure black or pure white.
    pub is_extreme: bool,
}

#[inline]
fn is_extreme_pixel(r: u8, g: u8, b: u8) -> bool {
    (r, g, b) == (0, 0, 0) || (r, g, b) == (255, 255, 255)
}

/// Samples every cell of `grid` from `frame`. `luma` must match the frame
/// dimensions, as must `edges` when present. Returns stats row-major.
pub fn sample_blocks(
    frame: &RgbaImage,
    luma: &ScalarField,
    edges: Option<&ScalarField>,
    grid: GridSize,
) -> Result<Vec<BlockStats>, ConfigError> {
    let (src_w, src_h) = frame.dimensions();
    let (step_x, step_y) = grid.steps(src_w, src_h)?;
    debug_assert_eq!((luma.width(), luma.height()), (src_w, src_h));

    let mut stats = Vec::with_capacity(grid.cell_count());
    for row in 0..grid.rows {
        let y0 = row * step_y;
        let y1 = (y0 + step_y).min(src_h);
        for col in 0..grid.columns {
            let x0 = col * step_x;
            let x1 = (x0 + step_x).min(src_w);

            let mut sum_luma = 0.0f64;
            let mut sum_edge = 0.0f64;
            let (mut sum_r, mut sum_g, mut sum_b) = (0u64, 0u64, 0u64);
            let mut is_extreme = true;

            for y in y0..y1 {
                for x in x0..x1 {
                    let px = frame.get_pixel(x, y);
                    let (r, g, b) = (px[0], px[1], px[2]);
                    sum_r += r as u64;
                    sum_g += g as u64;
                    sum_b += b as u64;
                    sum_luma += luma.get(x, y) as f64;
                    if let Some(edges) = edges {
                        sum_edge += edges.get(x, y) as f64;
                    }
                    is_extreme &= is_extreme_pixel(r, g, b);
                }
            }

            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let mean = |sum: u64| ((sum + count / 2) / count) as u8;
            stats.push(BlockStats {
                luminance: (sum_luma / count as f64) as f32,
                edge: (sum_edge / count as f64) as f32,
                color: Rgb([mean(sum_r), mean(sum_g), mean(sum_b)]),
                is_extreme,
            });
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::luminance;
    use image::Rgba;

    #[test]
    fn steps_floor_division() {
        assert_eq!(GridSize::new(10, 10).steps(105, 99).unwrap(), (10, 9));
        assert_eq!(GridSize::new(4, 4).steps(4, 4).unwrap(), (1, 1));
    }

    #[test]
    fn grid_larger_than_source_is_rejected() {
        let err = GridSize::new(5, 2).steps(4, 4).unwrap_err();
        assert!(matches!(err, ConfigError::GridExceedsSource { columns: 5, .. }));
    }

    #[test]
    fn zero_grid_is_rejected() {
        let err = GridSize::new(0, 2).steps(4, 4).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDimension { .. }));
    }

    #[test]
    fn fit_aspect_derives_rows_from_columns() {
        // 16:9 source, 10x20 cells: rows = 9/16 * 80 * 0.5 = 22.5 -> 23
        let fitted = GridSize::new(80, 60).fit_aspect(1920, 1080, 10, 20);
        assert_eq!(fitted, GridSize::new(80, 23));
    }

    #[test]
    fn fit_aspect_clamps_rows_and_rederives_columns() {
        // Tall source: rows would be 2 * 40 * 0.5 = 40 > 20.
        let fitted = GridSize::new(40, 20).fit_aspect(100, 200, 10, 20);
        assert_eq!(fitted, GridSize::new(20, 20));
    }

    #[test]
    fn uniform_block_mean_is_exact() {
        let frame = RgbaImage::from_pixel(6, 6, Rgba([17, 99, 230, 255]));
        let stats = sample_blocks(&frame, &luminance(&frame), None, GridSize::new(3, 2)).unwrap();
        assert_eq!(stats.len(), 6);
        for s in &stats {
            assert_eq!(s.color, Rgb([17, 99, 230]));
            assert!(!s.is_extreme);
            assert_eq!(s.edge, 0.0);
        }
    }

    #[test]
    fn mixed_block_averages_its_pixels() {
        let frame = RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([254, 254, 254, 255])
            }
        });
        let stats = sample_blocks(&frame, &luminance(&frame), None, GridSize::new(1, 1)).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].color, Rgb([127, 127, 127]));
        assert!((stats[0].luminance - 127.0).abs() < 1e-3);
        assert!(!stats[0].is_extreme);
    }

    #[test]
    fn one_grey_pixel_clears_extreme_flag() {
        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        for x in 0..2 {
            frame.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
        }
        frame.put_pixel(3, 3, Rgba([254, 255, 255, 255]));
        let stats = sample_blocks(&frame, &luminance(&frame), None, GridSize::new(2, 2)).unwrap();
        assert!(stats[0].is_extreme);
        assert!(stats[1].is_extreme);
        assert!(stats[2].is_extreme);
        assert!(!stats[3].is_extreme);
    }

    #[test]
    fn trailing_pixels_outside_grid_are_ignored() {
        // 5 columns / 2 cells -> step 2, last column never sampled.
        let mut frame = RgbaImage::from_pixel(5, 2, Rgba([40, 40, 40, 255]));
        for y in 0..2 {
            frame.put_pixel(4, y, Rgba([250, 0, 0, 255]));
        }
        let stats = sample_blocks(&frame, &luminance(&frame), None, GridSize::new(2, 1)).unwrap();
        assert_eq!(stats[1].color, Rgb([40, 40, 40]));
    }
}
