// ============================================================================
// patchfill CLI — headless batch region fill via command-line arguments
// ============================================================================
//
// Usage examples:
//   patchfill --input photo.png --mask hole.png --output result.png
//   patchfill -i photo.jpg -m hole.png -o out.jpg --quality 85
//   patchfill -i "shots/*.png" -m hole.png --output-dir filled/ --format png
//   patchfill -i photo.png -m hole.png -o out.png --snapshot-every 25 \
//             --snapshot-dir progress/
//
// All processing runs synchronously on the current thread; only the one-shot
// gradient passes inside the library fan out across cores.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::{SaveFormat, encode_and_write, load_mask, load_rgba};
use crate::ops::MASK_THRESHOLD;
use crate::ops::inpaint::{
    DEFAULT_HALF_PATCH_WIDTH, DEFAULT_SEARCH_RADIUS, FillParams, fill_region_with_progress,
};
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// patchfill headless region-fill processor.
///
/// Remove the pixels marked by a mask image and reconstruct them from the
/// surrounding picture content — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "patchfill",
    about = "patchfill headless batch region fill",
    long_about = "Fill masked regions of still images with plausible surrounding content.\n\
                  The mask is a grayscale image of the same size as the input; pixels\n\
                  brighter than the hole threshold are removed and reconstructed.\n\n\
                  Example:\n  \
                  patchfill --input photo.png --mask hole.png --output result.png\n  \
                  patchfill -i \"*.jpg\" -m hole.png --output-dir filled/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Mask image marking the pixels to remove (applied to every input;
    /// dimensions must match each input exactly).
    #[arg(short, long, value_name = "MASK")]
    pub mask: PathBuf,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's
    /// extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension,
    /// defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Patch half-width: fill patches are (2N+1)×(2N+1) pixels.
    #[arg(long, default_value_t = DEFAULT_HALF_PATCH_WIDTH, value_name = "N")]
    pub patch_radius: i32,

    /// Search radius around each target for candidate source patches.
    #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS, value_name = "N")]
    pub search_radius: i32,

    /// Write an intermediate snapshot every N fill iterations.
    #[arg(long, value_name = "N")]
    pub snapshot_every: Option<usize>,

    /// Directory for intermediate snapshots (default: alongside the output).
    #[arg(long, value_name = "DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Print per-file timing and iteration information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    // Resolve glob patterns / literal paths into concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    // Load the mask once; it is shared by every input
    let mask = match load_mask(&args.mask) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: could not load mask '{}': {}", args.mask.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let hole_pixels = mask.as_raw().iter().filter(|&&m| m > MASK_THRESHOLD).count();
    log_info!(
        "mask {} marks {} hole pixel(s)",
        args.mask.display(),
        hole_pixels
    );

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    let params = FillParams {
        half_patch_width: args.patch_radius,
        search_radius: args.search_radius,
    };

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let output_path = match build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) {
            Some(p) => p,
            None => {
                eprintln!(
                    "  error: cannot determine output path for '{}'.",
                    input_path.display()
                );
                any_failure = true;
                continue;
            }
        };

        match run_one(input_path, &output_path, &mask, &params, save_format, &args) {
            Ok(iterations) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({} iterations, {:.0}ms)",
                        output_path.display(),
                        iterations,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log_err!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    mask: &image::GrayImage,
    params: &FillParams,
    format: SaveFormat,
    args: &CliArgs,
) -> Result<usize, String> {
    // -- Step 1: Load ----------------------------------------------------
    let source = load_rgba(input).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Fill ----------------------------------------------------
    let snapshot_dir = args
        .snapshot_dir
        .clone()
        .or_else(|| output.parent().map(Path::to_path_buf));
    if args.snapshot_every.is_some()
        && let Some(dir) = &snapshot_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        return Err(format!(
            "could not create snapshot directory '{}': {}",
            dir.display(),
            e
        ));
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".into());
    let mut iterations = 0usize;

    let filled = fill_region_with_progress(&source, mask, params, |progress| {
        iterations = progress.iteration;
        if args.verbose && progress.iteration % 100 == 0 {
            println!(
                "  iteration {}: {} pixel(s) remaining",
                progress.iteration, progress.remaining
            );
        }
        if let Some(every) = args.snapshot_every
            && progress.iteration % every == 0
            && let Some(dir) = &snapshot_dir
        {
            let path = dir.join(format!("{}_iter{:05}.png", stem, progress.iteration));
            if let Err(e) = encode_and_write(progress.image, &path, SaveFormat::Png, 100) {
                eprintln!("  warning: snapshot failed: {}", e);
            }
        }
    })
    .map_err(|e| format!("fill failed: {}", e))?;

    log_info!("{}: filled in {} iterations", input.display(), iterations);

    // -- Step 3: Save ----------------------------------------------------
    encode_and_write(&filled, output, format, args.quality)
        .map_err(|e| format!("save failed: {}", e))?;

    Ok(iterations)
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
            // Literal path, use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
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

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).unwrap_or(SaveFormat::Png);
    }

    if let Some(out) = output {
        let ext = out.extension().and_then(|e| e.to_str()).unwrap_or("");
        return SaveFormat::from_name(ext).unwrap_or(SaveFormat::Png);
    }

    SaveFormat::Png
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_filled` to the stem if it would collide with the input)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    // Write next to the input file
    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_filled.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_falls_back_to_png() {
        assert_eq!(parse_format(None, None), SaveFormat::Png);
        assert_eq!(parse_format(Some("bogus"), None), SaveFormat::Png);
        assert_eq!(
            parse_format(None, Some(Path::new("out.jpg"))),
            SaveFormat::Jpeg
        );
        assert_eq!(parse_format(Some("tiff"), None), SaveFormat::Tiff);
    }

    #[test]
    fn output_path_avoids_clobbering_input() {
        let input = Path::new("dir/photo.png");
        let derived = build_output_path(input, None, None, SaveFormat::Png).unwrap();
        assert_eq!(derived, Path::new("dir/photo_filled.png"));

        let derived = build_output_path(input, None, None, SaveFormat::Jpeg).unwrap();
        assert_eq!(derived, Path::new("dir/photo.jpg"));

        let derived =
            build_output_path(input, None, Some(Path::new("out")), SaveFormat::Png).unwrap();
        assert_eq!(derived, Path::new("out/photo.png"));

        let explicit =
            build_output_path(input, Some(Path::new("x.png")), None, SaveFormat::Png).unwrap();
        assert_eq!(explicit, Path::new("x.png"));
    }
}
