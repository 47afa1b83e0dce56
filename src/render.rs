//! Re-rasterizes a glyph grid into an image using a TrueType font.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbaImage, Rgba};
use log::debug;

use crate::error::ConfigError;
use crate::glyph::{CharacterSet, GlyphGrid, BLANK};

const SHADOW_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const SHADOW_ALPHA: f32 = 0.5;
const SHADOW_OFFSET: u32 = 1;

/// Bold monospace fonts tried when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Bold.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Bold.ttf",
    "/usr/share/fonts/truetype/ubuntu/UbuntuMono-B.ttf",
    "/System/Library/Fonts/Supplemental/Courier New Bold.ttf",
    "/Library/Fonts/Courier New Bold.ttf",
    "C:\\Windows\\Fonts\\consolab.ttf",
    "C:\\Windows\\Fonts\\courbd.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
];

/// How glyphs are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    /// Each glyph takes its cell's averaged source color.
    Sampled,
    /// Every glyph uses one color.
    Fixed(Rgb<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStyle {
    pub cell_width: u32,
    pub cell_height: u32,
    pub background: Rgb<u8>,
    pub tint: Tint,
    /// Widen glyph strokes by one pixel.
    pub embolden: bool,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            cell_width: 10,
            cell_height: 20,
            background: Rgb([0, 0, 0]),
            tint: Tint::Sampled,
            embolden: false,
        }
    }
}

/// Coverage of one glyph inside a cell footprint, values in `[0, 1]`.
#[derive(Debug, Clone)]
struct GlyphMask {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl GlyphMask {
    fn is_empty(&self) -> bool {
        self.coverage.iter().all(|&c| c <= 0.0)
    }

    fn embolden(&mut self) {
        let w = self.width as usize;
        for row in self.coverage.chunks_mut(w) {
            for x in (1..w).rev() {
                row[x] = row[x].max(row[x - 1]);
            }
        }
    }
}

/// Draws glyph grids with a fixed font, footprint and colors.
///
/// Glyph masks for the active character set are rasterized once up front;
/// [`Renderer::render`] only blends cached coverage.
pub struct Renderer {
    font: FontArc,
    scale: PxScale,
    style: RenderStyle,
    masks: HashMap<char, GlyphMask>,
}

impl Renderer {
    pub fn new(font: FontArc, charset: &CharacterSet, style: RenderStyle) -> Result<Self, ConfigError> {
        if style.cell_width == 0 || style.cell_height == 0 {
            return Err(ConfigError::ZeroCellSize {
                width: style.cell_width,
                height: style.cell_height,
            });
        }
        canvas_size(1, 1, style.cell_width, style.cell_height)?;

        let scale = fit_scale(&font, charset, style.cell_width, style.cell_height);
        let mut renderer = Self {
            font,
            scale,
            style,
            masks: HashMap::with_capacity(charset.len()),
        };
        for &ch in charset.glyphs() {
            if ch == BLANK {
                continue;
            }
            let mask = renderer.rasterize(ch);
            renderer.masks.insert(ch, mask);
        }
        debug!(
            "renderer ready: {} glyphs at {:.1}px in {}x{} cells",
            renderer.masks.len(),
            scale.y,
            style.cell_width,
            style.cell_height
        );
        Ok(renderer)
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Pixel size of the image produced for `grid`.
    pub fn output_size(&self, grid: &GlyphGrid) -> Result<(u32, u32), ConfigError> {
        canvas_size(grid.columns(), grid.rows(), self.style.cell_width, self.style.cell_height)
    }

    pub fn render(&self, grid: &GlyphGrid) -> Result<RgbaImage, ConfigError> {
        let (w, h) = self.output_size(grid)?;
        let bg = self.style.background;
        let mut canvas = RgbaImage::from_pixel(w, h, Rgba([bg[0], bg[1], bg[2], 255]));

        for (col, row, cell) in grid.iter() {
            if cell.is_blank() {
                continue;
            }
            let mask = match self.masks.get(&cell.character) {
                Some(mask) => Cow::Borrowed(mask),
                None => Cow::Owned(self.rasterize(cell.character)),
            };
            if mask.is_empty() {
                continue;
            }

            let x = col * self.style.cell_width;
            let y = row * self.style.cell_height;
            stamp(&mut canvas, &mask, x + SHADOW_OFFSET, y + SHADOW_OFFSET, SHADOW_COLOR, SHADOW_ALPHA);

            let tint = match self.style.tint {
                Tint::Sampled => cell.color,
                Tint::Fixed(color) => color,
            };
            stamp(&mut canvas, &mask, x, y, tint, 1.0);
        }
        Ok(canvas)
    }

    /// Rasterizes `ch` centered in one cell footprint.
    fn rasterize(&self, ch: char) -> GlyphMask {
        let (w, h) = (self.style.cell_width, self.style.cell_height);
        let mut mask = GlyphMask {
            width: w,
            height: h,
            coverage: vec![0.0; w as usize * h as usize],
        };

        let scaled = self.font.as_scaled(self.scale);
        let mut glyph = scaled.scaled_glyph(ch);
        let advance = scaled.h_advance(glyph.id);
        let line_height = scaled.ascent() - scaled.descent();
        let x = (w as f32 - advance) / 2.0;
        let baseline = (h as f32 - line_height) / 2.0 + scaled.ascent();
        glyph.position = point(x, baseline);

        if let Some(outlined) = self.font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let (min_x, min_y) = (bounds.min.x as i64, bounds.min.y as i64);
            outlined.draw(|gx, gy, c| {
                let px = min_x + gx as i64;
                let py = min_y + gy as i64;
                if px >= 0 && py >= 0 && px < w as i64 && py < h as i64 {
                    let idx = py as usize * w as usize + px as usize;
                    mask.coverage[idx] = mask.coverage[idx].max(c.clamp(0.0, 1.0));
                }
            });
        }

        if self.style.embolden {
            mask.embolden();
        }
        mask
    }
}

/// Pixel size of a canvas holding `columns` x `rows` cells, or an error
/// when the canvas or its RGBA buffer would not be addressable.
pub fn canvas_size(columns: u32, rows: u32, cell_width: u32, cell_height: u32) -> Result<(u32, u32), ConfigError> {
    let too_large = || ConfigError::CanvasTooLarge {
        columns,
        rows,
        cell_width,
        cell_height,
    };
    let w = columns.checked_mul(cell_width).ok_or_else(too_large)?;
    let h = rows.checked_mul(cell_height).ok_or_else(too_large)?;
    (w as usize)
        .checked_mul(h as usize)
        .and_then(|px| px.checked_mul(4))
        .ok_or_else(too_large)?;
    Ok((w, h))
}

/// Largest pixel scale at which every glyph of `charset` fits the cell.
fn fit_scale(font: &FontArc, charset: &CharacterSet, cell_w: u32, cell_h: u32) -> PxScale {
    let base = PxScale::from(cell_h as f32);
    let scaled = font.as_scaled(base);
    let widest = charset
        .glyphs()
        .iter()
        .map(|&ch| scaled.h_advance(scaled.glyph_id(ch)))
        .fold(0.0f32, f32::max);
    if widest <= cell_w as f32 || widest <= 0.0 {
        return base;
    }
    PxScale::from(cell_h as f32 * cell_w as f32 / widest)
}

/// Alpha-blends `color` through `mask` onto the canvas at `(x, y)`,
/// clipped to the canvas.
fn stamp(canvas: &mut RgbaImage, mask: &GlyphMask, x: u32, y: u32, color: Rgb<u8>, alpha: f32) {
    let (cw, ch) = canvas.dimensions();
    for my in 0..mask.height {
        let py = y + my;
        if py >= ch {
            break;
        }
        for mx in 0..mask.width {
            let px = x + mx;
            if px >= cw {
                break;
            }
            let a = mask.coverage[(my * mask.width + mx) as usize] * alpha;
            if a <= 0.0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                let blended = color[c] as f32 * a + dst[c] as f32 * (1.0 - a);
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = 255;
        }
    }
}

/// Loads a TrueType/OpenType font from disk.
pub fn load_font(path: &Path) -> Result<FontArc, ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::FontLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| ConfigError::FontLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// First installed font from the built-in search list.
pub fn find_system_font() -> Option<PathBuf> {
    SYSTEM_FONTS.iter().map(PathBuf::from).find(|p| p.is_file())
}

/// Loads `configured` if given, otherwise the first system font found.
pub fn resolve_font(configured: Option<&Path>) -> Result<FontArc, ConfigError> {
    match configured {
        Some(path) => load_font(path),
        None => {
            let path = find_system_font().ok_or(ConfigError::FontNotFound)?;
            debug!("using system font {}", path.display());
            load_font(&path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::GlyphCell;
    use crate::sampler::GridSize;

    fn test_font() -> Option<FontArc> {
        let path = find_system_font()?;
        load_font(&path).ok()
    }

    fn grid_of(ch: char, color: Rgb<u8>, columns: u32, rows: u32) -> GlyphGrid {
        let cell = GlyphCell { character: ch, color };
        GlyphGrid::from_cells(GridSize::new(columns, rows), vec![cell; (columns * rows) as usize]).unwrap()
    }

    #[test]
    fn stamp_blends_and_clips() {
        let mut canvas = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        let mask = GlyphMask { width: 2, height: 2, coverage: vec![1.0; 4] };
        stamp(&mut canvas, &mask, 2, 2, Rgb([200, 100, 50]), 0.5);
        assert_eq!(*canvas.get_pixel(2, 2), Rgba([100, 50, 25, 255]));
        assert_eq!(*canvas.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn embolden_widens_strokes() {
        let mut mask = GlyphMask { width: 4, height: 1, coverage: vec![0.0, 1.0, 0.0, 0.0] };
        mask.embolden();
        assert_eq!(mask.coverage, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn canvas_size_multiplies_cells() {
        assert_eq!(canvas_size(16, 9, 10, 20).unwrap(), (160, 180));
    }

    #[test]
    fn overflowing_canvas_is_config_error() {
        assert!(matches!(
            canvas_size(160, 90, u32::MAX / 100, 20),
            Err(ConfigError::CanvasTooLarge { columns: 160, .. })
        ));
        assert!(matches!(
            canvas_size(1, 2, 10, u32::MAX),
            Err(ConfigError::CanvasTooLarge { .. })
        ));
    }

    #[test]
    fn missing_font_file_is_config_error() {
        let err = load_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, ConfigError::FontLoad { .. }));
    }

    #[test]
    fn blank_grid_shows_only_background() {
        let Some(font) = test_font() else {
            eprintln!("no system font installed, skipping");
            return;
        };
        let style = RenderStyle { background: Rgb([12, 34, 56]), ..RenderStyle::default() };
        let renderer = Renderer::new(font, &CharacterSet::default(), style).unwrap();
        let img = renderer.render(&grid_of(BLANK, Rgb([255, 0, 0]), 2, 2)).unwrap();
        assert_eq!(img.dimensions(), (20, 40));
        assert!(img.pixels().all(|p| *p == Rgba([12, 34, 56, 255])));
    }

    #[test]
    fn glyphs_take_cell_tint() {
        let Some(font) = test_font() else {
            eprintln!("no system font installed, skipping");
            return;
        };
        let renderer = Renderer::new(font, &CharacterSet::default(), RenderStyle::default()).unwrap();
        let img = renderer.render(&grid_of('@', Rgb([0, 255, 0]), 1, 1)).unwrap();
        assert!(img.pixels().any(|p| p[1] > 128));
        assert!(img.pixels().all(|p| p[0] == 0 && p[2] == 0));
    }

    #[test]
    fn fixed_tint_overrides_cell_color() {
        let Some(font) = test_font() else {
            eprintln!("no system font installed, skipping");
            return;
        };
        let style = RenderStyle { tint: Tint::Fixed(Rgb([255, 255, 255])), ..RenderStyle::default() };
        let renderer = Renderer::new(font, &CharacterSet::default(), style).unwrap();
        let img = renderer.render(&grid_of('#', Rgb([255, 0, 0]), 1, 1)).unwrap();
        assert!(img.pixels().any(|p| p[0] > 128));
        assert!(img.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }
}
