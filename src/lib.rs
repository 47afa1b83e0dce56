//! # glyphframe - glyph-grid frame renderer
//!
//! `glyphframe` turns still images (typically frames extracted from a video)
//! into colorized grids of text glyphs and renders those grids back into
//! images.
//!
//! ## Pipeline
//!
//! Each frame goes through the same six stages:
//!
//! 1. luminance extraction ([`field::luminance`])
//! 2. 5x5 Gaussian smoothing ([`field::smooth`])
//! 3. Sobel edge strength, normalized per frame ([`field::edge_strength`])
//! 4. block sampling into the output grid ([`sampler::sample_blocks`])
//! 5. glyph selection with flat-region suppression ([`glyph::select`])
//! 6. rendering with a drop shadow ([`render::Renderer`])
//!
//! Frames are independent, so directories are converted in parallel.
//!
//! ## Example
//!
//! ```no_run
//! use glyphframe::{ConversionOptions, GlyphConverter};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ConversionOptions::default().with_grid(120, 60);
//! let converter = GlyphConverter::new(options)?;
//! converter.convert_image(Path::new("frame_0001.png"), Path::new("out/frame_0001.png"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use glyphframe::{ConversionOptions, GlyphConverter, ProgressPhase};
//! use std::path::Path;
//!
//! let converter = GlyphConverter::new(ConversionOptions::default()).unwrap();
//! let report = converter.convert_directory_with_progress(
//!     Path::new("frames"),
//!     Path::new("rendered"),
//!     |progress| {
//!         if progress.phase == ProgressPhase::ConvertingFrames {
//!             println!("{}/{} ({:.1}%)", progress.completed, progress.total, progress.percentage);
//!         }
//!     },
//! ).unwrap();
//! println!("{} frames failed", report.failures.len());
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod glyph;
pub mod render;
pub mod sampler;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ab_glyph::FontArc;
use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub use config::{parse_color, AppConfig, ConversionOptions, OutputMode, Preset};
pub use error::ConfigError;
pub use glyph::{CharacterSet, GlyphCell, GlyphGrid, SelectionMode, SelectorTuning};
pub use render::{RenderStyle, Renderer, Tint};
pub use sampler::{BlockStats, GridSize};

/// Extensions picked up when converting a directory of frames.
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Represents the current phase of a conversion operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Converting frames to glyph images
    ConvertingFrames,
    /// Conversion finished (some frames may have failed)
    Complete,
}

/// Progress information for conversion operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Number of frames processed so far, failed ones included
    pub completed: usize,
    /// Total number of frames
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    pub fn converting_frames(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ConvertingFrames,
            completed,
            total,
            percentage,
            message: format!("Converting frame {} of {}", completed, total),
        }
    }

    pub fn complete(total_frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Conversion complete: {} frames", total_frames),
        }
    }
}

/// A frame that could not be converted.
#[derive(Debug, Clone)]
pub struct FrameFailure {
    pub frame: PathBuf,
    pub error: String,
}

/// Outcome of a directory conversion.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub converted: usize,
    pub failures: Vec<FrameFailure>,
}

impl BatchReport {
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.converted == 0
    }
}

/// Runs the analysis stages on one frame and returns its glyph grid.
pub fn build_grid(
    frame: &RgbaImage,
    grid: GridSize,
    charset: &CharacterSet,
    mode: SelectionMode,
    tuning: &SelectorTuning,
) -> Result<GlyphGrid, ConfigError> {
    let luma = field::luminance(frame);
    let edges = match mode {
        SelectionMode::EdgeWeighted => Some(field::edge_strength(&field::smooth(&luma))),
        SelectionMode::BrightnessOnly => None,
    };
    let stats = sampler::sample_blocks(frame, &luma, edges.as_ref(), grid)?;
    let cells = stats
        .iter()
        .map(|s| glyph::select(s, charset, mode, tuning))
        .collect();
    // sample_blocks yields exactly one entry per cell
    GlyphGrid::from_cells(grid, cells).ok_or(ConfigError::ZeroDimension {
        columns: grid.columns,
        rows: grid.rows,
    })
}

/// Converts frames to glyph-grid images with one fixed configuration.
///
/// The converter is immutable once built and can be shared across threads.
pub struct GlyphConverter {
    options: ConversionOptions,
    charset: CharacterSet,
    renderer: Renderer,
}

impl GlyphConverter {
    /// Validates `options` and loads the configured (or a system) font.
    pub fn new(options: ConversionOptions) -> Result<Self, ConfigError> {
        let font = render::resolve_font(options.font_path.as_deref())?;
        Self::with_font(options, font)
    }

    /// Like [`GlyphConverter::new`] with an already loaded font.
    pub fn with_font(options: ConversionOptions, font: FontArc) -> Result<Self, ConfigError> {
        let charset = CharacterSet::new(&options.charset)?;
        if options.columns == 0 || options.rows == 0 {
            return Err(ConfigError::ZeroDimension {
                columns: options.columns,
                rows: options.rows,
            });
        }
        let style = RenderStyle {
            cell_width: options.cell_width,
            cell_height: options.cell_height,
            background: options.background,
            tint: if options.color_sampling {
                Tint::Sampled
            } else {
                Tint::Fixed(options.font_color)
            },
            embolden: options.embolden,
        };
        render::canvas_size(options.columns, options.rows, style.cell_width, style.cell_height)?;
        let renderer = Renderer::new(font, &charset, style)?;
        Ok(Self {
            options,
            charset,
            renderer,
        })
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn charset(&self) -> &CharacterSet {
        &self.charset
    }

    /// Grid used for a source of `width` x `height`, checked against the
    /// source so every cell covers at least one pixel.
    pub fn grid_size_for(&self, width: u32, height: u32) -> Result<GridSize, ConfigError> {
        let requested = GridSize::new(self.options.columns, self.options.rows);
        let grid = if self.options.preserve_aspect_ratio {
            requested.fit_aspect(width, height, self.options.cell_width, self.options.cell_height)
        } else {
            requested
        };
        grid.steps(width, height)?;
        Ok(grid)
    }

    pub fn frame_to_grid(&self, frame: &RgbaImage) -> Result<GlyphGrid, ConfigError> {
        let (w, h) = frame.dimensions();
        let grid = self.grid_size_for(w, h)?;
        debug!("frame {}x{} -> grid {}x{}", w, h, grid.columns, grid.rows);
        build_grid(frame, grid, &self.charset, self.options.mode, &self.options.tuning)
    }

    pub fn render_grid(&self, grid: &GlyphGrid) -> Result<RgbaImage, ConfigError> {
        self.renderer.render(grid)
    }

    /// Full pipeline for an in-memory frame.
    pub fn convert_frame(&self, frame: &RgbaImage) -> Result<RgbaImage, ConfigError> {
        let grid = self.frame_to_grid(frame)?;
        self.renderer.render(&grid)
    }

    /// Glyph grid of an image file as text, one line per row.
    pub fn image_to_text(&self, input: &Path) -> Result<String> {
        let frame = open_frame(input)?;
        let grid = self
            .frame_to_grid(&frame)
            .with_context(|| format!("converting {}", input.display()))?;
        Ok(grid.to_text())
    }

    /// Converts one image file and writes the rendered image plus any
    /// sidecar files selected by the output mode.
    pub fn convert_image(&self, input: &Path, output: &Path) -> Result<()> {
        let frame = open_frame(input)?;
        let grid = self
            .frame_to_grid(&frame)
            .with_context(|| format!("converting {}", input.display()))?;
        let rendered = self
            .renderer
            .render(&grid)
            .with_context(|| format!("rendering {}", input.display()))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        rendered
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;

        match self.options.output_mode {
            OutputMode::ImageOnly => {}
            OutputMode::ImageAndText => {
                let txt = output.with_extension("txt");
                fs::write(&txt, grid.to_text()).with_context(|| format!("writing {}", txt.display()))?;
            }
            OutputMode::ImageAndColorFrame => {
                glyph::write_cframe(&grid, &output.with_extension("cframe"))?;
            }
        }
        Ok(())
    }

    /// Convert a directory of frames, writing `<stem>.png` for each into
    /// `output_dir`.
    pub fn convert_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport> {
        self.convert_directory_with_progress(input_dir, output_dir, |_| {})
    }

    /// Convert a directory of frames with detailed progress reporting.
    ///
    /// Configuration problems (checked against the first frame) and frames
    /// that would share an output file abort the batch before any frame is
    /// converted. A frame that fails on its own is
    /// logged, recorded in the report and skipped.
    pub fn convert_directory_with_progress<F>(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        progress_callback: F,
    ) -> Result<BatchReport>
    where
        F: Fn(Progress) + Send + Sync,
    {
        let frames = list_frames(input_dir)?;
        if frames.is_empty() {
            return Err(anyhow!("No frame images found in {}", input_dir.display()));
        }
        check_distinct_outputs(&frames, output_dir)?;

        fs::create_dir_all(output_dir).context("creating output directory")?;
        if same_dir(input_dir, output_dir) {
            return Err(anyhow!(
                "Output directory {} must differ from the input directory",
                output_dir.display()
            ));
        }

        match image::image_dimensions(&frames[0]) {
            Ok((w, h)) => {
                self.grid_size_for(w, h)?;
            }
            Err(e) => debug!("cannot read dimensions of {}: {}", frames[0].display(), e),
        }

        let total = frames.len();
        info!("converting {} frames from {}", total, input_dir.display());
        progress_callback(Progress::converting_frames(0, total));

        let completed = AtomicUsize::new(0);
        let results: Vec<(PathBuf, Result<()>)> = frames
            .into_par_iter()
            .map(|frame_path| {
                let result = output_path_for(&frame_path, output_dir)
                    .and_then(|out| self.convert_image(&frame_path, &out));
                let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress_callback(Progress::converting_frames(current, total));
                (frame_path, result)
            })
            .collect();

        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        for (frame, result) in results {
            match result {
                Ok(()) => report.converted += 1,
                Err(e) => {
                    warn!("skipping frame {}: {:#}", frame.display(), e);
                    report.failures.push(FrameFailure {
                        frame,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            "converted {}/{} frames into {}",
            report.converted,
            total,
            output_dir.display()
        );
        progress_callback(Progress::complete(total));
        Ok(report)
    }
}

fn open_frame(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgba8())
}

/// Frame images directly inside `dir`, sorted by name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Input directory does not exist: {}", dir.display()));
    }
    let mut frames: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_frame_image(p))
        .collect();
    frames.sort();
    Ok(frames)
}

fn is_frame_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FRAME_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn output_path_for(frame: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = frame
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("bad file name {}", frame.display()))?;
    Ok(output_dir.join(format!("{}.png", stem)))
}

/// Fails when two frames differ only by extension, since both would be
/// written to the same `<stem>.png` and sidecars.
fn check_distinct_outputs(frames: &[PathBuf], output_dir: &Path) -> Result<()> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::with_capacity(frames.len());
    for frame in frames {
        // Unnamed frames fail individually later.
        let Ok(out) = output_path_for(frame, output_dir) else {
            continue;
        };
        if let Some(first) = seen.insert(out.clone(), frame.as_path()) {
            return Err(anyhow!(
                "Frames {} and {} would both be written to {}",
                first.display(),
                frame.display(),
                out.display()
            ));
        }
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn all_extreme_frame_is_blank() {
        let mut frame = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        for y in 0..20 {
            for x in (y % 3..20).step_by(3) {
                frame.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let grid = build_grid(
            &frame,
            GridSize::new(5, 4),
            &CharacterSet::default(),
            SelectionMode::EdgeWeighted,
            &SelectorTuning::default(),
        )
        .unwrap();
        assert!(grid.cells().iter().all(GlyphCell::is_blank));
    }

    #[test]
    fn uniform_grey_maps_to_one_glyph() {
        let frame = RgbaImage::from_pixel(40, 40, Rgba([128, 128, 128, 255]));
        let charset = CharacterSet::new("abcdefghijklmnopqrst").unwrap();
        let grid = build_grid(
            &frame,
            GridSize::new(8, 8),
            &charset,
            SelectionMode::EdgeWeighted,
            &SelectorTuning::default(),
        )
        .unwrap();
        // floor(0.1506 * 17) + 1 = 3
        assert!(grid.cells().iter().all(|c| c.character == 'd'));
        assert!(grid.cells().iter().all(|c| c.color == Rgb([128, 128, 128])));
    }

    #[test]
    fn brightness_only_skips_edges() {
        let mut frame = RgbaImage::from_pixel(20, 20, Rgba([60, 60, 60, 255]));
        for y in 0..20 {
            for x in 10..20 {
                frame.put_pixel(x, y, Rgba([200, 200, 200, 255]));
            }
        }
        let charset = CharacterSet::default();
        let grid = build_grid(
            &frame,
            GridSize::new(4, 2),
            &charset,
            SelectionMode::BrightnessOnly,
            &SelectorTuning::default(),
        )
        .unwrap();
        // Cells on either side of the boundary only see brightness.
        assert_eq!(grid.cell(0, 0).character, grid.cell(1, 0).character);
        assert_eq!(grid.cell(2, 0).character, grid.cell(3, 0).character);
    }

    #[test]
    fn grid_larger_than_frame_fails() {
        let frame = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]));
        let err = build_grid(
            &frame,
            GridSize::new(8, 2),
            &CharacterSet::default(),
            SelectionMode::EdgeWeighted,
            &SelectorTuning::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::GridExceedsSource { .. }));
    }

    #[test]
    fn progress_percentage() {
        let p = Progress::converting_frames(1, 4);
        assert_eq!(p.percentage, 25.0);
        assert_eq!(Progress::converting_frames(0, 0).percentage, 0.0);
        assert_eq!(Progress::complete(3).phase, ProgressPhase::Complete);
    }

    #[test]
    fn frames_sharing_a_stem_collide() {
        let out = Path::new("rendered");
        let frames = [
            PathBuf::from("frames/frame_0001.bmp"),
            PathBuf::from("frames/frame_0001.png"),
            PathBuf::from("frames/frame_0002.png"),
        ];
        let err = check_distinct_outputs(&frames, out).unwrap_err().to_string();
        assert!(err.contains("frame_0001.bmp") && err.contains("frame_0001.png"), "{err}");
        assert!(check_distinct_outputs(&frames[1..], out).is_ok());
    }

    #[test]
    fn frame_listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0002.png", "frame_0001.JPG", "notes.txt", "frame_0003.bmp"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = list_frames(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_0001.JPG", "frame_0002.png", "frame_0003.bmp"]);
    }
}
