// ============================================================================
// OPS MODULE — image-processing operations for patchfill
// ============================================================================
//
// Architecture:
//   kernels.rs — pixel-level primitives: luminance plane, Scharr derivative
//                magnitudes, generic 3×3 correlation over scalar grids
//   inpaint.rs — the exemplar-based fill engine built on those primitives
// ============================================================================

pub mod inpaint;
pub mod kernels;

/// Mask intensities strictly above this value mark a pixel as part of the
/// hole. Anti-aliased mask strokes keep their faint fringe as known pixels.
pub const MASK_THRESHOLD: u8 = 10;
