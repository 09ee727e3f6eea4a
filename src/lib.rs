// ============================================================================
// patchfill — exemplar-based region fill for still images
// ============================================================================
//
// Library layout:
//   cli.rs     — headless batch driver (clap + glob)
//   io.rs      — image/mask decode and format-dispatched encode
//   logger.rs  — session file logger with log_info!/log_warn!/log_err! macros
//   ops/       — the fill engine and the pixel-level kernels it consumes
// ============================================================================

pub mod cli;
pub mod io;
pub mod logger;
pub mod ops;

pub use ops::inpaint::{
    FillError, FillParams, FillProgress, fill_region, fill_region_with_progress,
};
