use std::path::PathBuf;

/// Problems with the conversion setup. These are fatal and are reported
/// before any frame is converted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("character set needs at least 3 glyphs, got {len}")]
    CharsetTooShort { len: usize },

    #[error("grid dimensions must be positive (columns={columns}, rows={rows})")]
    ZeroDimension { columns: u32, rows: u32 },

    #[error("cell footprint must be positive (width={width}, height={height})")]
    ZeroCellSize { width: u32, height: u32 },

    #[error("output canvas of {columns}x{rows} cells at {cell_width}x{cell_height} px is too large")]
    CanvasTooLarge {
        columns: u32,
        rows: u32,
        cell_width: u32,
        cell_height: u32,
    },

    #[error("grid {columns}x{rows} is larger than the {width}x{height} source frame")]
    GridExceedsSource {
        columns: u32,
        rows: u32,
        width: u32,
        height: u32,
    },

    #[error("invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),

    #[error("no usable font found; pass --font or set font_path in the config")]
    FontNotFound,

    #[error("failed to load font {path}: {reason}")]
    FontLoad { path: PathBuf, reason: String },
}
