use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use glyphframe::{parse_color, AppConfig, ConversionOptions, GlyphConverter, OutputMode, ProgressPhase, SelectionMode};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        return AppConfig::from_file(p);
    }

    // Look for a config in app support, then the current dir, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("glyphframe");
        d.push("glyphframe.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("glyphframe.json"));
    tried.push(PathBuf::from("glyphframe.toml"));

    for p in &tried {
        if p.exists() {
            info!("using config {}", p.display());
            return AppConfig::from_file(p);
        }
    }

    Ok(AppConfig::default())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Sidecar {
    /// Plain text grid
    Text,
    /// Binary glyph + color grid
    Cframe,
}

#[derive(Parser, Debug)]
#[command(version, about = "Render still images or frame directories as colorized glyph grids.")]
struct Args {
    /// Input image or directory of frame images
    input: PathBuf,

    /// Output image (for a single input) or directory (for a frame directory)
    out: Option<PathBuf>,

    /// Config file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Glyph columns
    #[arg(long)]
    columns: Option<u32>,

    /// Glyph rows
    #[arg(long)]
    rows: Option<u32>,

    /// Use default quality preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["small", "large"])]
    default: bool,

    /// Use the small preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "large"])]
    small: bool,

    /// Use the large preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "small"])]
    large: bool,

    /// Glyph ramp, sparsest to densest
    #[arg(long)]
    charset: Option<String>,

    /// Fit the grid to the source aspect ratio
    #[arg(long, default_value_t = false)]
    preserve_aspect: bool,

    /// Background color (#rrggbb)
    #[arg(long)]
    background: Option<String>,

    /// Glyph color when --mono is set (#rrggbb)
    #[arg(long)]
    font_color: Option<String>,

    /// Draw every glyph in the font color instead of sampled colors
    #[arg(long, default_value_t = false)]
    mono: bool,

    /// Pick glyphs from brightness alone, skipping edge detection
    #[arg(long, default_value_t = false)]
    brightness_only: bool,

    /// TrueType/OpenType font to draw with
    #[arg(long)]
    font: Option<PathBuf>,

    /// Pixel width of one glyph cell
    #[arg(long)]
    cell_width: Option<u32>,

    /// Pixel height of one glyph cell
    #[arg(long)]
    cell_height: Option<u32>,

    /// Thicken glyph strokes by one pixel
    #[arg(long, default_value_t = false)]
    bold: bool,

    /// Also write a sidecar per frame
    #[arg(long, value_enum)]
    sidecar: Option<Sidecar>,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Log details to standard output
    #[arg(long, default_value_t = false)]
    log_details: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("configuring worker threads")?;
    }

    let cfg = load_config(args.config.as_deref())?;
    let active_preset_name = if args.small {
        "small"
    } else if args.large {
        "large"
    } else if args.default {
        cfg.default_preset.as_str()
    } else {
        // no flag behaves like --default
        cfg.default_preset.as_str()
    };

    let conv_opts = build_options(&args, &cfg, active_preset_name)?;
    let converter = GlyphConverter::new(conv_opts.clone())?;

    let input_path = &args.input;
    let output_path = if input_path.is_dir() {
        args.out.clone().unwrap_or_else(|| sibling_with_suffix(input_path, "_glyphs"))
    } else {
        args.out.clone().unwrap_or_else(|| input_path.with_extension("glyphs.png"))
    };

    let frame_count;
    let failures;
    if input_path.is_file() {
        println!("Converting image...");
        converter.convert_image(input_path, &output_path)?;
        frame_count = 1;
        failures = 0;
    } else if input_path.is_dir() {
        println!("Converting directory of frames...");
        let progress_bar: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
        let pb_clone = Arc::clone(&progress_bar);

        let report = converter.convert_directory_with_progress(input_path, &output_path, move |progress| {
            let Ok(mut pb_guard) = pb_clone.lock() else {
                return;
            };
            if pb_guard.is_none() {
                // Initialize progress bar on first callback
                let pb = ProgressBar::new(progress.total as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                *pb_guard = Some(pb);
            }
            if let Some(ref pb) = *pb_guard {
                pb.set_position(progress.completed as u64);
                if progress.phase == ProgressPhase::Complete {
                    pb.finish_with_message("Done");
                }
            }
        })?;

        for failure in &report.failures {
            eprintln!("Failed: {}: {}", failure.frame.display(), failure.error);
        }
        if report.all_failed() {
            return Err(anyhow!("All {} frames failed to convert", report.total));
        }
        if !report.failures.is_empty() {
            warn!("{} of {} frames failed", report.failures.len(), report.total);
        }
        frame_count = report.converted;
        failures = report.failures.len();
    } else {
        return Err(anyhow!("Input path does not exist"));
    }

    println!("\nGlyph rendering complete in {}", output_path.display());

    // --- Create details.md ---
    let details = format!(
        "Version: {}\nFrames: {}\nFailed: {}\nGrid: {}x{}\nCell: {}x{}\nPreserve aspect: {}\nCharset: \"{}\"\nMode: {:?}\nColor sampling: {}",
        env!("CARGO_PKG_VERSION"),
        frame_count,
        failures,
        conv_opts.columns,
        conv_opts.rows,
        conv_opts.cell_width,
        conv_opts.cell_height,
        conv_opts.preserve_aspect_ratio,
        conv_opts.charset,
        conv_opts.mode,
        conv_opts.color_sampling,
    );

    if input_path.is_dir() {
        let details_path = output_path.join("details.md");
        fs::write(details_path, &details).context("writing details file")?;
    }

    if args.log_details {
        println!("\n--- Generation Details ---");
        println!("{}", details);
    }

    Ok(())
}

fn build_options(args: &Args, cfg: &AppConfig, preset_name: &str) -> Result<ConversionOptions> {
    let mut opts = cfg
        .options_for(preset_name)
        .with_context(|| format!("Missing preset '{}' in config", preset_name))?;

    if let Some(c) = args.columns {
        opts.columns = c;
    }
    if let Some(r) = args.rows {
        opts.rows = r;
    }
    if let Some(w) = args.cell_width {
        opts.cell_width = w;
    }
    if let Some(h) = args.cell_height {
        opts.cell_height = h;
    }
    if let Some(ref charset) = args.charset {
        opts.charset = charset.clone();
    }
    if let Some(ref bg) = args.background {
        opts.background = parse_color(bg)?;
    }
    if let Some(ref fc) = args.font_color {
        opts.font_color = parse_color(fc)?;
    }
    if args.font.is_some() {
        opts.font_path = args.font.clone();
    }

    opts.preserve_aspect_ratio = args.preserve_aspect;
    opts.color_sampling = !args.mono;
    opts.embolden = args.bold;
    if args.brightness_only {
        opts.mode = SelectionMode::BrightnessOnly;
    }
    opts.output_mode = match args.sidecar {
        None => OutputMode::ImageOnly,
        Some(Sidecar::Text) => OutputMode::ImageAndText,
        Some(Sidecar::Cframe) => OutputMode::ImageAndColorFrame,
    };
    Ok(opts)
}

/// `frames/` -> `frames_glyphs/`
fn sibling_with_suffix(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("frames");
    dir.with_file_name(format!("{}{}", name, suffix))
}
