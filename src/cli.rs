// ============================================================================
// paintfe-engine CLI: headless canvas operations via command-line arguments
// ============================================================================
//
// Usage examples:
//   paintfe-engine -i photo.png -o cropped.png --crop 10,10,200,120 --crop-layers
//   paintfe-engine -i photo.png -o padded.png --resize 640,480,20,20
//   paintfe-engine -i photo.png -o moved.png --float 0,0,64,64 --move 32,0
//   paintfe-engine -i "shots/*.png" --output-dir out/ --crop 0,0,100,100
//
// Each input is loaded as a single "Background" layer, the requested
// operations run in the order resize, crop, float, and the projection is
// written back out.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::channel::ChannelOp;
use crate::composite;
use crate::config::EngineConfig;
use crate::geometry::Rect;
use crate::image::{Image, QUICK_MASK_NAME};
use crate::item::{DrawableRef, Positioned};
use crate::ops;
use crate::progress::LogProgress;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Headless layer and selection engine.
#[derive(Parser, Debug)]
#[command(
    name = "paintfe-engine",
    about = "Crop, resize and move image regions without a GUI",
    long_about = "Load images as single-layer documents, run canvas operations on them\n\
                  and write the flattened result.\n\n\
                  Example:\n  \
                  paintfe-engine -i photo.png -o out.png --crop 10,10,200,120 --crop-layers\n  \
                  paintfe-engine -i photo.png -o out.png --float 0,0,64,64 --move 32,0"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Engine configuration file (TOML).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Resize the canvas: new width, new height, content offset.
    #[arg(long, value_name = "W,H,OX,OY", value_parser = parse_quad)]
    pub resize: Option<[i32; 4]>,

    /// Crop the canvas to the rectangle between two corners.
    #[arg(long, value_name = "X1,Y1,X2,Y2", value_parser = parse_quad)]
    pub crop: Option<[i32; 4]>,

    /// Clip layers to the cropped canvas and drop layers outside it.
    #[arg(long, requires = "crop")]
    pub crop_layers: bool,

    /// Float a rectangular region of the layer.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_quad)]
    pub float: Option<[i32; 4]>,

    /// Offset applied to the floated region before it is anchored.
    #[arg(long = "move", value_name = "DX,DY", value_parser = parse_pair, requires = "float")]
    pub move_by: Option<[i32; 2]>,

    /// Invert the float region by editing it as a quick mask first.
    #[arg(long, requires = "float")]
    pub quick_mask: bool,

    /// Log to stderr at debug level and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_ints<const N: usize>(s: &str) -> Result<[i32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated integers, got '{}'", N, s));
    }
    let mut out = [0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|e| format!("'{}': {}", part, e))?;
    }
    Ok(out)
}

fn parse_quad(s: &str) -> Result<[i32; 4], String> {
    parse_ints::<4>(s)
}

fn parse_pair(s: &str) -> Result<[i32; 2], String> {
    parse_ints::<2>(s)
}

// ============================================================================
// Public entry point
// ============================================================================

/// Load the engine configuration named by `--config`, or the defaults.
pub fn load_config(args: &CliArgs) -> Result<EngineConfig, String> {
    match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs, config: EngineConfig) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref()) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args, &config) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log::error!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, output: &Path, args: &CliArgs, config: &EngineConfig) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let pixels = image::open(input).map_err(|e| format!("load failed: {}", e))?.to_rgba8();
    let mut doc = Image::with_config(pixels.width() as i32, pixels.height() as i32, config.clone());
    let layer = doc.new_layer_from_rgba(&pixels, "Background");
    let layer = doc.add_layer(layer, None, false);

    // -- Step 2: Canvas operations ---------------------------------------
    if let Some([w, h, ox, oy]) = args.resize {
        if w <= 0 || h <= 0 {
            return Err(format!("invalid resize size {}x{}", w, h));
        }
        ops::resize::resize(&mut doc, w, h, ox, oy, &mut LogProgress::new("resize"));
    }

    if let Some([x1, y1, x2, y2]) = args.crop {
        if x2 <= x1 || y2 <= y1 {
            return Err(format!("empty crop rectangle ({}, {})..({}, {})", x1, y1, x2, y2));
        }
        ops::crop::crop(&mut doc, x1, y1, x2, y2, args.crop_layers);
    }

    if let Some([x, y, w, h]) = args.float {
        ops::selection::select_rect(&mut doc, Rect::new(x, y, w, h), ChannelOp::Replace, true);
        if args.quick_mask {
            invert_through_quick_mask(&mut doc);
        }
        // Cropping may have removed the layer
        let target = doc.active_drawable().unwrap_or(DrawableRef::Layer(layer));
        let [dx, dy] = args.move_by.unwrap_or([0, 0]);
        let fs = ops::selection::float(&mut doc, target, true, dx, dy).map_err(|e| e.to_string())?;
        ops::floating_sel::anchor(&mut doc, fs);
    }

    // -- Step 3: Save ----------------------------------------------------
    let flat = composite::project(&doc);
    flat.save(output).map_err(|e| format!("save failed: {}", e))?;
    log::info!("wrote {} ({}x{})", output.display(), flat.width(), flat.height());
    Ok(())
}

/// Toggle quick mask on, invert the mask channel, toggle off again.
fn invert_through_quick_mask(doc: &mut Image) {
    ops::quick_mask::set_quick_mask_state(doc, true);
    if let Some(mask) = doc.channel_by_name(QUICK_MASK_NAME).map(|c| c.id()) {
        ops::channel::invert(doc, DrawableRef::Channel(mask), true);
    }
    ops::quick_mask::set_quick_mask_state(doc, false);
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, keeps the input file name)
/// 3. Fallback: next to the input with `_out` appended to the stem
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let file_name = input.file_name()?;
    if let Some(dir) = output_dir {
        return Some(dir.join(file_name));
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let ext = input.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_else(|| "png".to_string());
    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_out.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_lists_parse() {
        assert_eq!(parse_quad("1, 2,3,-4"), Ok([1, 2, 3, -4]));
        assert!(parse_quad("1,2,3").is_err());
        assert!(parse_pair("a,1").is_err());
    }

    #[test]
    fn flags_are_wired() {
        let args = CliArgs::try_parse_from([
            "paintfe-engine", "-i", "in.png", "-o", "out.png", "--crop", "0,0,4,4", "--crop-layers", "--float",
            "1,1,2,2", "--move", "3,0",
        ])
        .unwrap();
        assert_eq!(args.crop, Some([0, 0, 4, 4]));
        assert!(args.crop_layers);
        assert_eq!(args.move_by, Some([3, 0]));
        assert!(CliArgs::try_parse_from(["paintfe-engine", "-i", "in.png", "--crop-layers"]).is_err());
    }

    #[test]
    fn output_paths() {
        let input = Path::new("shots/a.jpg");
        assert_eq!(build_output_path(input, None, Some(Path::new("out"))), Some(PathBuf::from("out/a.jpg")));
        assert_eq!(build_output_path(input, None, None), Some(PathBuf::from("shots/a_out.jpg")));
    }

    #[test]
    fn quick_mask_inverts_the_selection() {
        let mut doc = Image::new(6, 6);
        let layer = doc.new_layer(6, 6, "Background", true);
        doc.add_layer(layer, None, false);
        ops::selection::select_rect(&mut doc, Rect::new(0, 0, 3, 6), ChannelOp::Replace, false);
        invert_through_quick_mask(&mut doc);
        assert_eq!(doc.selection().value(1, 1), 0);
        assert_eq!(doc.selection().value(4, 1), 255);
    }
}
