//! Character sets, glyph selection and the glyph grid itself.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sampler::{BlockStats, GridSize};

/// The glyph drawn for suppressed cells.
pub const BLANK: char = ' ';

/// Default ramp. Higher scores select later glyphs, so edges and bright
/// regions get the heavier marks.
pub const DEFAULT_CHARSET: &str = " .:-=+*#%@";

/// Ordered glyph ramp, sparsest at index 0 and densest at the last index.
/// The first and last entries are boundary slots that edge-weighted
/// selection never picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSet {
    glyphs: Vec<char>,
}

impl CharacterSet {
    pub const MIN_LEN: usize = 3;

    pub fn new(glyphs: &str) -> Result<Self, ConfigError> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.len() < Self::MIN_LEN {
            return Err(ConfigError::CharsetTooShort { len: glyphs.len() });
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyph(&self, index: usize) -> char {
        self.glyphs[index.min(self.glyphs.len() - 1)]
    }

    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }
}

impl Default for CharacterSet {
    fn default() -> Self {
        Self {
            glyphs: DEFAULT_CHARSET.chars().collect(),
        }
    }
}

/// Which signals drive glyph choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Blend of edge strength and brightness.
    #[default]
    EdgeWeighted,
    /// Brightness alone; skips the smoothing and edge passes.
    BrightnessOnly,
}

/// Thresholds and blend weights used by glyph selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTuning {
    /// Cells darker than this are blank.
    pub dark_cutoff: f32,
    /// Cells brighter than this are blank.
    pub light_cutoff: f32,
    pub edge_weight: f32,
    pub luminance_weight: f32,
}

impl Default for SelectorTuning {
    fn default() -> Self {
        Self {
            dark_cutoff: 5.0,
            light_cutoff: 250.0,
            edge_weight: 0.7,
            luminance_weight: 0.3,
        }
    }
}

/// One cell of the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphCell {
    pub character: char,
    /// Mean color of the source block, kept even for blank cells.
    pub color: Rgb<u8>,
}

impl GlyphCell {
    pub fn is_blank(&self) -> bool {
        self.character == BLANK
    }
}

/// Picks the glyph index for one block, or `None` when the block is
/// suppressed.
pub fn glyph_index(
    stats: &BlockStats,
    charset: &CharacterSet,
    mode: SelectionMode,
    tuning: &SelectorTuning,
) -> Option<usize> {
    if stats.is_extreme
        || stats.luminance < tuning.dark_cutoff
        || stats.luminance > tuning.light_cutoff
    {
        return None;
    }

    // CharacterSet::new guarantees len >= MIN_LEN
    let len = charset.len();
    let (score, span) = match mode {
        SelectionMode::EdgeWeighted => (
            (stats.edge * tuning.edge_weight + stats.luminance * tuning.luminance_weight) / 255.0,
            len - 3,
        ),
        SelectionMode::BrightnessOnly => (stats.luminance / 255.0, len - 2),
    };
    let score = score.clamp(0.0, 1.0);
    let index = (score * span as f32).floor() as usize + 1;
    Some(index.min(len - 1))
}

pub fn select(
    stats: &BlockStats,
    charset: &CharacterSet,
    mode: SelectionMode,
    tuning: &SelectorTuning,
) -> GlyphCell {
    let character = match glyph_index(stats, charset, mode, tuning) {
        Some(index) => charset.glyph(index),
        None => BLANK,
    };
    GlyphCell {
        character,
        color: stats.color,
    }
}

/// Row-major grid of glyph cells for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphGrid {
    size: GridSize,
    cells: Vec<GlyphCell>,
}

impl GlyphGrid {
    pub fn from_cells(size: GridSize, cells: Vec<GlyphCell>) -> Option<Self> {
        if cells.len() != size.cell_count() {
            return None;
        }
        Some(Self { size, cells })
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn columns(&self) -> u32 {
        self.size.columns
    }

    pub fn rows(&self) -> u32 {
        self.size.rows
    }

    pub fn cell(&self, column: u32, row: u32) -> &GlyphCell {
        &self.cells[row as usize * self.size.columns as usize + column as usize]
    }

    pub fn cells(&self) -> &[GlyphCell] {
        &self.cells
    }

    /// Iterates `(column, row, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &GlyphCell)> {
        let columns = self.size.columns as usize;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| ((i % columns) as u32, (i / columns) as u32, cell))
    }

    /// Glyphs as text, one line per row.
    pub fn to_text(&self) -> String {
        let columns = self.size.columns as usize;
        let mut out = String::with_capacity((columns + 1) * self.size.rows as usize);
        for row in self.cells.chunks(columns.max(1)) {
            out.extend(row.iter().map(|c| c.character));
            out.push('\n');
        }
        out
    }
}

/// Writes the grid as a `.cframe` file.
///
/// Header (8 bytes): width (u32 LE) + height (u32 LE).
/// Body: for each cell, row-major: char (u8) + r + g + b.
pub fn write_cframe(grid: &GlyphGrid, path: &Path) -> Result<()> {
    let mut buf = Vec::with_capacity(8 + grid.cells.len() * 4);
    buf.write_all(&grid.columns().to_le_bytes())?;
    buf.write_all(&grid.rows().to_le_bytes())?;
    for cell in &grid.cells {
        let ch = if cell.character.is_ascii() { cell.character as u8 } else { b'?' };
        buf.write_all(&[ch, cell.color[0], cell.color[1], cell.color[2]])?;
    }
    fs::write(path, buf).with_context(|| format!("writing cframe file {}", path.display()))
}

/// Reads a `.cframe` file written by [`write_cframe`].
pub fn read_cframe(path: &Path) -> Result<GlyphGrid> {
    let mut file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header)
        .with_context(|| format!("reading cframe header of {}", path.display()))?;
    let columns = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let rows = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let mut body = Vec::new();
    file.read_to_end(&mut body)?;
    let size = GridSize::new(columns, rows);
    if body.len() != size.cell_count() * 4 {
        return Err(anyhow!(
            "cframe {} is truncated: expected {} cells, found {} bytes",
            path.display(),
            size.cell_count(),
            body.len()
        ));
    }

    let cells = body
        .chunks_exact(4)
        .map(|c| GlyphCell {
            character: c[0] as char,
            color: Rgb([c[1], c[2], c[3]]),
        })
        .collect();
    GlyphGrid::from_cells(size, cells).ok_or_else(|| anyhow!("cframe cell count mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(luminance: f32, edge: f32) -> BlockStats {
        BlockStats {
            luminance,
            edge,
            color: Rgb([1, 2, 3]),
            is_extreme: false,
        }
    }

    #[test]
    fn short_charset_is_rejected() {
        assert!(matches!(
            CharacterSet::new("#."),
            Err(ConfigError::CharsetTooShort { len: 2 })
        ));
        assert!(CharacterSet::new("#+.").is_ok());
    }

    #[test]
    fn extreme_block_is_blank_but_keeps_color() {
        let mut s = stats(128.0, 0.0);
        s.is_extreme = true;
        let cell = select(&s, &CharacterSet::default(), SelectionMode::EdgeWeighted, &SelectorTuning::default());
        assert!(cell.is_blank());
        assert_eq!(cell.color, Rgb([1, 2, 3]));
    }

    #[test]
    fn luminance_cutoffs_suppress() {
        let tuning = SelectorTuning::default();
        let charset = CharacterSet::default();
        for l in [0.0, 4.9, 250.1, 255.0] {
            assert_eq!(glyph_index(&stats(l, 0.0), &charset, SelectionMode::EdgeWeighted, &tuning), None);
        }
        assert!(glyph_index(&stats(5.0, 0.0), &charset, SelectionMode::EdgeWeighted, &tuning).is_some());
        assert!(glyph_index(&stats(250.0, 0.0), &charset, SelectionMode::EdgeWeighted, &tuning).is_some());
    }

    #[test]
    fn edge_weighted_reserves_boundary_slots() {
        let tuning = SelectorTuning::default();
        let charset = CharacterSet::default();
        assert_eq!(glyph_index(&stats(5.0, 0.0), &charset, SelectionMode::EdgeWeighted, &tuning), Some(1));
        assert_eq!(glyph_index(&stats(250.0, 255.0), &charset, SelectionMode::EdgeWeighted, &tuning), Some(7));
    }

    #[test]
    fn shortest_charset_selects_without_underflow() {
        let tuning = SelectorTuning::default();
        let charset = CharacterSet::new("abc").unwrap();
        // Edge-weighted span is len - 3 = 0: only the middle glyph is reachable.
        for (l, e) in [(5.0, 0.0), (128.0, 128.0), (250.0, 255.0)] {
            assert_eq!(glyph_index(&stats(l, e), &charset, SelectionMode::EdgeWeighted, &tuning), Some(1));
        }
        // Brightness span is len - 2 = 1.
        assert_eq!(glyph_index(&stats(250.0, 0.0), &charset, SelectionMode::BrightnessOnly, &tuning), Some(1));
        let cell = select(&stats(128.0, 0.0), &charset, SelectionMode::BrightnessOnly, &tuning);
        assert_eq!(cell.character, 'b');
    }

    #[test]
    fn mid_grey_score() {
        // 128 * 0.3 / 255 = 0.1506 -> floor(0.1506 * 7) + 1 = 2
        let idx = glyph_index(
            &stats(128.0, 0.0),
            &CharacterSet::default(),
            SelectionMode::EdgeWeighted,
            &SelectorTuning::default(),
        );
        assert_eq!(idx, Some(2));
    }

    #[test]
    fn brightness_only_is_monotonic() {
        let tuning = SelectorTuning::default();
        let charset = CharacterSet::default();
        let mut last = 0;
        for l in 5..=250 {
            let idx = glyph_index(&stats(l as f32, 0.0), &charset, SelectionMode::BrightnessOnly, &tuning).unwrap();
            assert!(idx >= last, "index dropped at luminance {l}");
            assert!((1..10).contains(&idx));
            last = idx;
        }
    }

    #[test]
    fn grid_text_has_one_line_per_row() {
        let cell = GlyphCell { character: '#', color: Rgb([0, 0, 0]) };
        let grid = GlyphGrid::from_cells(GridSize::new(3, 2), vec![cell; 6]).unwrap();
        assert_eq!(grid.to_text(), "###\n###\n");
        assert!(GlyphGrid::from_cells(GridSize::new(3, 2), vec![cell; 5]).is_none());
    }

    #[test]
    fn cframe_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0001.cframe");
        let cells = vec![
            GlyphCell { character: '@', color: Rgb([255, 0, 0]) },
            GlyphCell { character: ' ', color: Rgb([0, 0, 255]) },
        ];
        let grid = GlyphGrid::from_cells(GridSize::new(2, 1), cells).unwrap();
        write_cframe(&grid, &path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 8 + 2 * 4);
        assert_eq!(read_cframe(&path).unwrap(), grid);
    }
}
