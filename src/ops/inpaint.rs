// ============================================================================
// Exemplar-based region fill (object removal)
// ============================================================================
//
// Reconstructs a masked region by repeatedly copying the best-matching patch
// of known pixels onto the highest-priority location on the hole boundary:
//
//   1. Detect the fill front (known pixels bordering the hole) and its
//      boundary normals.
//   2. Score every front pixel: confidence (how much of its neighborhood is
//      already known) times data term (how strongly the local isophote
//      crosses the boundary). Structure propagates before texture.
//   3. Search a window around the winner for the source patch with the
//      lowest masked SSD; exact ties go to the flatter patch.
//   4. Copy color + gradients into the still-unknown pixels of the target
//      patch, flip them to known, repeat until the hole is gone.
//
// The image gradient field is computed once up front and refreshed per-pixel
// as patches are copied in; it is deliberately never re-derived globally, so
// filled areas carry the gradients of their source material.

use image::{GrayImage, RgbaImage};

use super::MASK_THRESHOLD;
use super::kernels;

pub const DEFAULT_HALF_PATCH_WIDTH: i32 = 4;
pub const DEFAULT_SEARCH_RADIUS: i32 = 40;

/// Added to every data term so flat regions keep a non-zero priority and the
/// front still advances along smooth isophotes.
const DATA_TERM_FLOOR: f32 = 0.001;

/// Boundary detector: 8-neighbor sum minus 8× center, applied to the target
/// region. Strictly positive responses are known pixels touching the hole.
const BOUNDARY_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, -8.0, 1.0, 1.0, 1.0, 1.0];

/// Central-difference kernels over the source region, used to find the
/// direction from unknown into known territory at each front pixel.
const REGION_DIFF_X: [f32; 9] = [0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
const REGION_DIFF_Y: [f32; 9] = [0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];

// -- Public surface --------------------------------------------------------

/// Tuning parameters for a fill run.
#[derive(Clone, Copy, Debug)]
pub struct FillParams {
    /// Patch half-width `h`; patches are `(2h+1)×(2h+1)`, clamped at edges.
    pub half_patch_width: i32,
    /// Candidate patches are searched within this radius of the target.
    pub search_radius: i32,
}

impl Default for FillParams {
    fn default() -> Self {
        FillParams {
            half_patch_width: DEFAULT_HALF_PATCH_WIDTH,
            search_radius: DEFAULT_SEARCH_RADIUS,
        }
    }
}

#[derive(Debug)]
pub enum FillError {
    /// Bad caller input, detected before any working grid is built.
    InvalidInput(String),
    /// No source patch in the search window could serve the given target
    /// pixel. Fatal: retrying with identical state cannot make progress.
    NoCandidatePatch { x: u32, y: u32 },
}

impl std::fmt::Display for FillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            FillError::NoCandidatePatch { x, y } => write!(
                f,
                "no usable source patch for target pixel ({}, {}); \
                 the hole may be too large for the image or search radius",
                x, y
            ),
        }
    }
}

/// Read-only view of the fill state, handed to the progress callback once
/// per completed iteration.
pub struct FillProgress<'a> {
    /// Working image after this iteration's patch copy.
    pub image: &'a RgbaImage,
    /// 1-based iteration count.
    pub iteration: usize,
    /// Hole pixels still unfilled.
    pub remaining: usize,
    /// The front pixel this iteration filled around.
    pub target: (u32, u32),
}

/// Fill the pixels marked by `mask` (intensity > [`MASK_THRESHOLD`]) with
/// material copied from the rest of `image`. Returns the filled image.
pub fn fill_region(
    image: &RgbaImage,
    mask: &GrayImage,
    params: &FillParams,
) -> Result<RgbaImage, FillError> {
    fill_region_with_progress(image, mask, params, |_| {})
}

/// [`fill_region`] with a per-iteration callback. The callback must treat
/// the snapshot as read-only; it cannot affect the fill.
pub fn fill_region_with_progress(
    image: &RgbaImage,
    mask: &GrayImage,
    params: &FillParams,
    mut on_iteration: impl FnMut(&FillProgress<'_>),
) -> Result<RgbaImage, FillError> {
    validate(image, mask, params)?;

    let mut ctx = FillContext::new(image, mask, params);
    ctx.compute_gradients();
    run_fill(&mut ctx, &mut on_iteration)?;
    Ok(ctx.work)
}

fn validate(image: &RgbaImage, mask: &GrayImage, params: &FillParams) -> Result<(), FillError> {
    if image.dimensions() != mask.dimensions() {
        return Err(FillError::InvalidInput(format!(
            "image is {}x{} but mask is {}x{}",
            image.width(),
            image.height(),
            mask.width(),
            mask.height()
        )));
    }
    if params.half_patch_width < 1 {
        return Err(FillError::InvalidInput(format!(
            "half patch width must be at least 1, got {}",
            params.half_patch_width
        )));
    }
    if params.search_radius < 1 {
        return Err(FillError::InvalidInput(format!(
            "search radius must be at least 1, got {}",
            params.search_radius
        )));
    }

    let hole = mask
        .as_raw()
        .iter()
        .filter(|&&m| m > MASK_THRESHOLD)
        .count();
    if hole == 0 {
        return Err(FillError::InvalidInput(
            "mask marks no pixels to fill".into(),
        ));
    }
    if hole == mask.as_raw().len() {
        return Err(FillError::InvalidInput(
            "mask covers the entire image; no known pixels to sample from".into(),
        ));
    }
    Ok(())
}

// -- Working state ---------------------------------------------------------

/// All grids for one fill run. Built from the caller's image and mask,
/// mutated in place each iteration, discarded when the run ends.
struct FillContext {
    width: usize,
    height: usize,
    /// Working copy of the image; hole pixels are overwritten as the fill
    /// proceeds and the final state is the result.
    work: RgbaImage,
    /// 255 where the pixel is currently known, 0 inside the hole.
    source: Vec<u8>,
    /// Complement of `source` at all times.
    target: Vec<u8>,
    /// Frozen copy of `source` at init. Patch search only accepts material
    /// from here, so invented pixels are never resold as ground truth.
    original_source: Vec<u8>,
    /// Evidence measure in [0, 1]: 1 for original pixels, the propagated
    /// front value for filled ones.
    confidence: Vec<f32>,
    /// Isophote estimate, valid only where `source` is set. Refreshed
    /// per-pixel on fill, never recomputed globally.
    gradient_x: Vec<f32>,
    gradient_y: Vec<f32>,
    /// Isophote/normal alignment, written at front pixels each iteration.
    data_term: Vec<f32>,
    /// Current boundary pixels in column-major scan order, with the matching
    /// boundary normal for each (zero vector for degenerate geometry).
    fill_front: Vec<(u32, u32)>,
    normals: Vec<(f32, f32)>,
    /// Hole pixels not yet filled; 0 terminates the loop.
    remaining: usize,
    half_patch_width: i32,
    search_radius: i32,
}

impl FillContext {
    fn new(image: &RgbaImage, mask: &GrayImage, params: &FillParams) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let n = width * height;
        let mask_raw = mask.as_raw();

        let mut source = vec![0u8; n];
        let mut target = vec![0u8; n];
        let mut confidence = vec![0.0f32; n];
        let mut remaining = 0usize;
        for i in 0..n {
            if mask_raw[i] > MASK_THRESHOLD {
                target[i] = 255;
                remaining += 1;
            } else {
                source[i] = 255;
                confidence[i] = 1.0;
            }
        }
        let original_source = source.clone();

        FillContext {
            width,
            height,
            work: image.clone(),
            source,
            target,
            original_source,
            confidence,
            gradient_x: Vec::new(),
            gradient_y: Vec::new(),
            data_term: vec![0.0f32; n],
            fill_front: Vec::new(),
            normals: Vec::new(),
            remaining,
            half_patch_width: params.half_patch_width,
            search_radius: params.search_radius,
        }
    }

    /// One-shot isophote field: Scharr magnitudes of the luminance plane,
    /// zeroed wherever the pixel is unknown so the hole cannot bias the
    /// data term.
    fn compute_gradients(&mut self) {
        let luma = kernels::luminance_plane(&self.work);
        let (mut gx, mut gy) = kernels::scharr_gradients(&luma, self.width, self.height);
        for i in 0..gx.len() {
            if self.source[i] == 0 {
                gx[i] = 0.0;
                gy[i] = 0.0;
            }
        }
        self.gradient_x = gx;
        self.gradient_y = gy;
    }

    /// Rebuild the fill front and its normals from the current regions.
    ///
    /// Front pixels are scanned column-major (x outer, y inner); that order
    /// is the documented tie-break for equal priorities and never changes.
    fn compute_fill_front(&mut self) {
        let target_plane: Vec<f32> = self.target.iter().map(|&t| (t > 0) as u8 as f32).collect();
        let source_plane: Vec<f32> = self.source.iter().map(|&s| (s > 0) as u8 as f32).collect();

        let boundary = kernels::correlate3x3(&target_plane, self.width, self.height, &BOUNDARY_KERNEL);
        let region_dx = kernels::correlate3x3(&source_plane, self.width, self.height, &REGION_DIFF_X);
        let region_dy = kernels::correlate3x3(&source_plane, self.width, self.height, &REGION_DIFF_Y);

        self.fill_front.clear();
        self.normals.clear();
        for x in 0..self.width {
            for y in 0..self.height {
                let i = y * self.width + x;
                if boundary[i] <= 0.0 {
                    continue;
                }
                self.fill_front.push((x as u32, y as u32));

                // Normal = the region gradient rotated 90°. A zero gradient
                // (isolated boundary geometry) stays the zero vector.
                let (dx, dy) = (region_dx[i], region_dy[i]);
                let (nx, ny) = (dy, -dx);
                let norm = (nx * nx + ny * ny).sqrt();
                if norm != 0.0 {
                    self.normals.push((nx / norm, ny / norm));
                } else {
                    self.normals.push((0.0, 0.0));
                }
            }
        }
    }

    /// Patch bounds around a center pixel, clamped to the image. Returns
    /// inclusive `(min_x, min_y, max_x, max_y)`.
    fn patch_bounds(&self, cx: i32, cy: i32) -> (i32, i32, i32, i32) {
        let min_x = (cx - self.half_patch_width).max(0);
        let max_x = (cx + self.half_patch_width).min(self.width as i32 - 1);
        let min_y = (cy - self.half_patch_width).max(0);
        let max_y = (cy + self.half_patch_width).min(self.height as i32 - 1);
        (min_x, min_y, max_x, max_y)
    }

    /// Confidence of each front pixel: known-pixel confidence mass in its
    /// patch over the full patch area.
    ///
    /// Values are written back into the grid immediately, in front order, so
    /// later front pixels in the same iteration see the updated numbers.
    /// That in-place ordering is part of the algorithm's deterministic
    /// behavior; do not batch the writes.
    fn compute_confidence(&mut self) {
        let w = self.width;
        for i in 0..self.fill_front.len() {
            let (px, py) = self.fill_front[i];
            let (ax, ay, bx, by) = self.patch_bounds(px as i32, py as i32);
            let mut total = 0.0f32;
            for x in ax..=bx {
                for y in ay..=by {
                    let idx = y as usize * w + x as usize;
                    if self.target[idx] == 0 {
                        total += self.confidence[idx];
                    }
                }
            }
            let area = ((bx - ax + 1) * (by - ay + 1)) as f32;
            self.confidence[py as usize * w + px as usize] = total / area;
        }
    }

    /// Data term of each front pixel: |isophote · boundary normal|, floored
    /// so flat regions still advance.
    fn compute_data_term(&mut self) {
        let w = self.width;
        for (i, &(px, py)) in self.fill_front.iter().enumerate() {
            let (nx, ny) = self.normals[i];
            let idx = py as usize * w + px as usize;
            self.data_term[idx] =
                (self.gradient_x[idx] * nx + self.gradient_y[idx] * ny).abs() + DATA_TERM_FLOOR;
        }
    }

    /// Index into `fill_front` of the pixel with the strictly greatest
    /// priority (data × confidence). Ties keep the earliest front pixel.
    fn select_target(&self) -> usize {
        let w = self.width;
        let mut best = 0usize;
        let mut max_priority = 0.0f32;
        for (i, &(px, py)) in self.fill_front.iter().enumerate() {
            let idx = py as usize * w + px as usize;
            let priority = self.data_term[idx] * self.confidence[idx];
            if priority > max_priority {
                max_priority = priority;
                best = i;
            }
        }
        best
    }

    /// Search the window around the target for the best source patch.
    ///
    /// Candidates are rejected outright if any of their pixels fall outside
    /// the original source region. The error is a masked SSD over the patch
    /// border (interior offsets are skipped, trading accuracy for speed)
    /// restricted to offsets whose destination pixel is currently known.
    /// Exact error ties are broken by the lower patch variance, evaluated
    /// lazily for the incumbent and the challenger only.
    ///
    /// Returns the winning patch's upper-left corner.
    fn find_best_patch(&self, front_index: usize) -> Result<(i32, i32), FillError> {
        let (cx, cy) = self.fill_front[front_index];
        let (ax, ay, bx, by) = self.patch_bounds(cx as i32, cy as i32);
        let patch_w = bx - ax + 1;
        let patch_h = by - ay + 1;
        let w = self.width as i32;
        let h = self.height as i32;
        let work_raw = self.work.as_raw();

        // Candidate upper-left corners; the clamp keeps whole patches inside
        // the image, so candidate reads never need bounds checks.
        let min_x = (cx as i32 - self.search_radius).max(0);
        let max_x = (cx as i32 + self.search_radius).min(w - patch_w);
        let min_y = (cy as i32 - self.search_radius).max(0);
        let max_y = (cy as i32 + self.search_radius).min(h - patch_h);

        let mut best: Option<(i32, i32)> = None;
        let mut min_error = f64::MAX;
        let mut best_variance = f64::MAX;

        for x in min_x..=max_x {
            for y in min_y..=max_y {
                let mut patch_error = 0.0f64;
                let mut mean = [0.0f64; 3];
                let mut valid = 0usize;
                let mut skip = false;

                'offsets: for x2 in 0..patch_w {
                    for y2 in 0..patch_h {
                        let cand = ((y + y2) * w + (x + x2)) as usize;
                        if self.original_source[cand] == 0 {
                            skip = true;
                            break 'offsets;
                        }
                        // Border-only comparison: interior offsets are
                        // skipped once the patch is wide enough to have one.
                        if x2 > 1 && x2 < patch_w - 2 && y2 > 1 && y2 < patch_h - 2 {
                            continue;
                        }
                        // Only known destination pixels carry evidence.
                        let dest = ((ay + y2) * w + (ax + x2)) as usize;
                        if self.source[dest] == 0 {
                            continue;
                        }

                        let sp = &work_raw[cand * 4..cand * 4 + 3];
                        let dp = &work_raw[dest * 4..dest * 4 + 3];
                        for c in 0..3 {
                            let d = sp[c] as f64 - dp[c] as f64;
                            patch_error += d * d;
                            mean[c] += sp[c] as f64;
                        }
                        valid += 1;
                    }
                }
                if skip || valid == 0 {
                    continue;
                }

                patch_error /= valid as f64;
                for c in &mut mean {
                    *c /= valid as f64;
                }

                if patch_error < min_error {
                    min_error = patch_error;
                    best = Some((x, y));
                    best_variance = self.patch_variance(x, y, ax, ay, patch_w, patch_h, &mean);
                } else if patch_error == min_error {
                    let variance = self.patch_variance(x, y, ax, ay, patch_w, patch_h, &mean);
                    if variance < best_variance {
                        best = Some((x, y));
                        best_variance = variance;
                    }
                }
            }
        }

        best.ok_or(FillError::NoCandidatePatch { x: cx, y: cy })
    }

    /// Color spread of a candidate patch around its own contributing-pixel
    /// means, measured only at offsets whose destination pixel is unknown
    /// (the pixels the candidate would actually supply).
    fn patch_variance(
        &self,
        sx: i32,
        sy: i32,
        ax: i32,
        ay: i32,
        patch_w: i32,
        patch_h: i32,
        mean: &[f64; 3],
    ) -> f64 {
        let w = self.width as i32;
        let work_raw = self.work.as_raw();
        let mut variance = 0.0f64;
        for x2 in 0..patch_w {
            for y2 in 0..patch_h {
                let dest = ((ay + y2) * w + (ax + x2)) as usize;
                if self.source[dest] != 0 {
                    continue;
                }
                let cand = ((sy + y2) * w + (sx + x2)) as usize;
                let sp = &work_raw[cand * 4..cand * 4 + 3];
                for c in 0..3 {
                    let d = sp[c] as f64 - mean[c];
                    variance += d * d;
                }
            }
        }
        variance
    }

    /// Copy the winning patch into the target patch's still-unknown pixels:
    /// color and gradients come from the source offsets, confidence is the
    /// front pixel's own just-computed value propagated uniformly, and each
    /// pixel flips from target to source. Known pixels inside the patch
    /// rectangle are never touched.
    fn apply_patch(&mut self, front_index: usize, best_ul: (i32, i32)) {
        let (tx, ty) = self.fill_front[front_index];
        let (ax, ay, bx, by) = self.patch_bounds(tx as i32, ty as i32);
        let patch_w = bx - ax + 1;
        let patch_h = by - ay + 1;
        let w = self.width as i32;
        let new_confidence = self.confidence[ty as usize * self.width + tx as usize];

        for x2 in 0..patch_w {
            for y2 in 0..patch_h {
                let dest = ((ay + y2) * w + (ax + x2)) as usize;
                if self.target[dest] == 0 {
                    continue;
                }
                let cand = ((best_ul.1 + y2) * w + (best_ul.0 + x2)) as usize;

                let raw = self.work.as_mut();
                let pixel = [
                    raw[cand * 4],
                    raw[cand * 4 + 1],
                    raw[cand * 4 + 2],
                    raw[cand * 4 + 3],
                ];
                raw[dest * 4..dest * 4 + 4].copy_from_slice(&pixel);

                self.gradient_x[dest] = self.gradient_x[cand];
                self.gradient_y[dest] = self.gradient_y[cand];
                self.confidence[dest] = new_confidence;
                self.source[dest] = 255;
                self.target[dest] = 0;
                self.remaining -= 1;
            }
        }
    }
}

/// The iterative loop: front → priorities → best patch → copy, until no
/// target pixels remain. Validation guarantees both regions start non-empty,
/// so the front cannot be empty while `remaining > 0`.
fn run_fill(
    ctx: &mut FillContext,
    on_iteration: &mut impl FnMut(&FillProgress<'_>),
) -> Result<(), FillError> {
    let mut iteration = 0usize;
    while ctx.remaining > 0 {
        ctx.compute_fill_front();
        ctx.compute_confidence();
        ctx.compute_data_term();
        let front_index = ctx.select_target();
        let best_ul = ctx.find_best_patch(front_index)?;
        ctx.apply_patch(front_index, best_ul);

        iteration += 1;
        on_iteration(&FillProgress {
            image: &ctx.work,
            iteration,
            remaining: ctx.remaining,
            target: ctx.fill_front[front_index],
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid_image(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn rect_mask(w: u32, h: u32, x0: u32, y0: u32, mw: u32, mh: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in y0..y0 + mh {
            for x in x0..x0 + mw {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        mask
    }

    fn context(image: &RgbaImage, mask: &GrayImage, half_patch_width: i32) -> FillContext {
        let params = FillParams {
            half_patch_width,
            search_radius: DEFAULT_SEARCH_RADIUS,
        };
        let mut ctx = FillContext::new(image, mask, &params);
        ctx.compute_gradients();
        ctx
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let image = solid_image(8, 8, [10, 10, 10]);
        let mask = rect_mask(9, 8, 2, 2, 2, 2);
        match fill_region(&image, &mask, &FillParams::default()) {
            Err(FillError::InvalidInput(msg)) => assert!(msg.contains("8x8")),
            other => panic!("expected InvalidInput, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_empty_mask() {
        let image = solid_image(8, 8, [10, 10, 10]);
        let mask = GrayImage::new(8, 8);
        assert!(matches!(
            fill_region(&image, &mask, &FillParams::default()),
            Err(FillError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_full_mask() {
        let image = solid_image(8, 8, [10, 10, 10]);
        let mask = rect_mask(8, 8, 0, 0, 8, 8);
        assert!(matches!(
            fill_region(&image, &mask, &FillParams::default()),
            Err(FillError::InvalidInput(_))
        ));
    }

    #[test]
    fn mask_threshold_is_strict() {
        let image = solid_image(12, 12, [80, 90, 100]);

        // Intensity exactly at the threshold is NOT a hole...
        let mut mask = GrayImage::new(12, 12);
        mask.put_pixel(6, 6, image::Luma([MASK_THRESHOLD]));
        assert!(matches!(
            fill_region(&image, &mask, &FillParams::default()),
            Err(FillError::InvalidInput(_))
        ));

        // ...one step above it is.
        mask.put_pixel(6, 6, image::Luma([MASK_THRESHOLD + 1]));
        let params = FillParams {
            half_patch_width: 2,
            ..FillParams::default()
        };
        let filled = fill_region(&image, &mask, &params).expect("single-pixel fill");
        assert_eq!(filled.get_pixel(6, 6), image.get_pixel(6, 6));
    }

    #[test]
    fn init_regions_are_complementary() {
        let image = solid_image(10, 10, [1, 2, 3]);
        let mask = rect_mask(10, 10, 3, 4, 4, 3);
        let ctx = context(&image, &mask, 2);

        assert_eq!(ctx.remaining, 12);
        for i in 0..100 {
            assert!(
                (ctx.source[i] > 0) != (ctx.target[i] > 0),
                "source/target must disagree at {}",
                i
            );
            if ctx.target[i] > 0 {
                assert_eq!(ctx.confidence[i], 0.0);
                assert_eq!(ctx.original_source[i], 0);
            } else {
                assert_eq!(ctx.confidence[i], 1.0);
                assert_eq!(ctx.original_source[i], 255);
            }
        }
    }

    #[test]
    fn gradients_are_zero_outside_source() {
        // A hard edge through the hole: the masked pixels must still read
        // zero gradient so the hole cannot bias the data term.
        let mut image = solid_image(10, 10, [0, 0, 0]);
        for y in 0..10 {
            for x in 5..10 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let mask = rect_mask(10, 10, 4, 4, 3, 3);
        let ctx = context(&image, &mask, 2);

        for i in 0..100 {
            if ctx.source[i] == 0 {
                assert_eq!(ctx.gradient_x[i], 0.0);
                assert_eq!(ctx.gradient_y[i], 0.0);
            }
        }
        // The edge is still visible in the known region.
        assert!(ctx.gradient_x[7 * 10 + 5] > 0.0);
    }

    #[test]
    fn fill_front_is_known_side_in_column_major_order() {
        let image = solid_image(7, 7, [50, 50, 50]);
        let mask = rect_mask(7, 7, 3, 3, 1, 1);
        let mut ctx = context(&image, &mask, 1);
        ctx.compute_fill_front();

        // The front is the 8 known neighbors of the hole, x-outer scan order.
        assert_eq!(
            ctx.fill_front,
            vec![
                (2, 2),
                (2, 3),
                (2, 4),
                (3, 2),
                (3, 4),
                (4, 2),
                (4, 3),
                (4, 4)
            ]
        );
        for &(x, y) in &ctx.fill_front {
            assert!(ctx.source[y as usize * 7 + x as usize] > 0);
        }
    }

    #[test]
    fn fill_front_normals_rotate_the_region_gradient() {
        let image = solid_image(7, 7, [50, 50, 50]);
        let mask = rect_mask(7, 7, 3, 3, 1, 1);
        let mut ctx = context(&image, &mask, 1);
        ctx.compute_fill_front();

        // Left of the hole at (2,3): region gradient is (-1, 0), so the
        // rotated unit normal is (0, 1).
        let i = ctx.fill_front.iter().position(|&p| p == (2, 3)).unwrap();
        assert_eq!(ctx.normals[i], (0.0, 1.0));

        // Above the hole at (3,2): gradient (0, -1) rotates to (-1, 0).
        let i = ctx.fill_front.iter().position(|&p| p == (3, 2)).unwrap();
        assert_eq!(ctx.normals[i], (-1.0, 0.0));
    }

    #[test]
    fn confidence_is_known_fraction_of_patch() {
        let image = solid_image(7, 7, [50, 50, 50]);
        let mask = rect_mask(7, 7, 3, 3, 1, 1);
        let mut ctx = context(&image, &mask, 1);
        ctx.compute_fill_front();
        ctx.compute_confidence();

        // 3×3 patch around the first front pixel (2,2) holds 8 known pixels
        // of confidence 1 and the hole pixel; 8/9 of the area is evidence.
        let got = ctx.confidence[2 * 7 + 2];
        assert!((got - 8.0 / 9.0).abs() < 1e-6, "got {}", got);

        // Later front pixels see earlier in-place writes: the patch of
        // (2,3) contains (2,2), whose value just dropped to 8/9.
        let got = ctx.confidence[3 * 7 + 2];
        let expected = (7.0 + 8.0 / 9.0) / 9.0;
        assert!((got - expected).abs() < 1e-6, "got {}", got);
    }

    #[test]
    fn target_selection_maximizes_priority_with_first_wins_ties() {
        let image = solid_image(9, 9, [50, 50, 50]);
        let mask = rect_mask(9, 9, 4, 4, 1, 1);
        let mut ctx = context(&image, &mask, 1);

        ctx.fill_front = vec![(1, 1), (2, 1), (3, 1), (4, 1)];
        let w = ctx.width;
        for (i, &(x, y)) in ctx.fill_front.iter().enumerate() {
            let idx = y as usize * w + x as usize;
            ctx.confidence[idx] = 0.5;
            ctx.data_term[idx] = match i {
                1 => 0.8, // priority 0.40 — the strict maximum
                3 => 0.8, // equal priority, later in scan order
                _ => 0.2,
            };
        }
        assert_eq!(ctx.select_target(), 1);

        // With all priorities equal, the first front pixel wins.
        for &(x, y) in &ctx.fill_front {
            ctx.data_term[y as usize * w + x as usize] = 0.8;
        }
        assert_eq!(ctx.select_target(), 0);
    }

    #[test]
    fn patch_bounds_clamp_to_image() {
        let image = solid_image(10, 8, [0, 0, 0]);
        let mask = rect_mask(10, 8, 4, 4, 1, 1);
        let ctx = context(&image, &mask, 4);

        assert_eq!(ctx.patch_bounds(0, 0), (0, 0, 4, 4));
        assert_eq!(ctx.patch_bounds(9, 7), (5, 3, 9, 7));
        assert_eq!(ctx.patch_bounds(5, 4), (1, 0, 9, 7));
    }

    #[test]
    fn patch_matcher_breaks_ssd_ties_by_lower_variance() {
        // 11×3 flat gray canvas, one hole pixel at (5,1). With a 3×3 patch
        // every offset is border, so the SSD reads the 8 known destination
        // pixels. Pixel (1,1) = 130 only shows up as the *supplied* center
        // of candidate (0,0) — zero SSD, high variance — and as a scored
        // border pixel of candidate (1,0), knocking that one out on error.
        // Candidate (2,0) ties at zero SSD with zero variance and must win.
        let mut image = solid_image(11, 3, [100, 100, 100]);
        image.put_pixel(1, 1, Rgba([130, 130, 130, 255]));
        let mask = rect_mask(11, 3, 5, 1, 1, 1);
        let mut ctx = context(&image, &mask, 1);

        ctx.fill_front = vec![(5, 1)];
        let best = ctx.find_best_patch(0).expect("candidates exist");
        assert_eq!(best, (2, 0));
    }

    #[test]
    fn no_candidate_patch_is_an_error() {
        // 10×10 with a central hole pixel and a 9×9 patch: every possible
        // candidate window overlaps the hole, so the fill must abort rather
        // than loop forever.
        let image = solid_image(10, 10, [60, 60, 60]);
        let mask = rect_mask(10, 10, 5, 5, 1, 1);
        let params = FillParams {
            half_patch_width: 4,
            search_radius: 40,
        };
        match fill_region(&image, &mask, &params) {
            Err(FillError::NoCandidatePatch { .. }) => {}
            other => panic!("expected NoCandidatePatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn apply_patch_fills_only_unknown_pixels_and_keeps_regions_complementary() {
        let mut image = solid_image(12, 12, [10, 20, 30]);
        // Distinct band so copied material is identifiable.
        for y in 0..12 {
            image.put_pixel(0, y, Rgba([200, 0, 0, 255]));
        }
        let mask = rect_mask(12, 12, 6, 6, 2, 2);
        let mut ctx = context(&image, &mask, 2);
        ctx.compute_fill_front();
        ctx.compute_confidence();
        ctx.compute_data_term();

        let front_index = ctx.select_target();
        let before_remaining = ctx.remaining;
        let best_ul = ctx.find_best_patch(front_index).unwrap();
        ctx.apply_patch(front_index, best_ul);

        assert!(ctx.remaining < before_remaining, "fill must make progress");
        for i in 0..ctx.source.len() {
            assert!((ctx.source[i] > 0) != (ctx.target[i] > 0));
        }
        // Known pixels keep their colors.
        assert_eq!(*ctx.work.get_pixel(0, 0), Rgba([200, 0, 0, 255]));
        assert_eq!(*ctx.work.get_pixel(3, 3), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn filled_pixels_inherit_target_confidence_uniformly() {
        let image = solid_image(14, 14, [90, 90, 90]);
        let mask = rect_mask(14, 14, 6, 6, 2, 2);
        let mut ctx = context(&image, &mask, 2);
        ctx.compute_fill_front();
        ctx.compute_confidence();
        ctx.compute_data_term();

        let front_index = ctx.select_target();
        let (tx, ty) = ctx.fill_front[front_index];
        let target_confidence = ctx.confidence[ty as usize * 14 + tx as usize];
        assert!(target_confidence > 0.0 && target_confidence < 1.0);

        let was_target: Vec<bool> = ctx.target.iter().map(|&t| t > 0).collect();
        let best_ul = ctx.find_best_patch(front_index).unwrap();
        ctx.apply_patch(front_index, best_ul);

        for i in 0..ctx.source.len() {
            if was_target[i] && ctx.source[i] > 0 {
                assert_eq!(ctx.confidence[i], target_confidence);
            }
        }
    }

    #[test]
    fn remaining_count_is_strictly_decreasing_until_done() {
        let image = solid_image(20, 20, [40, 80, 120]);
        let mask = rect_mask(20, 20, 8, 8, 4, 4);
        let params = FillParams {
            half_patch_width: 2,
            search_radius: 40,
        };
        let mut ctx = FillContext::new(&image, &mask, &params);
        ctx.compute_gradients();

        let mut last = ctx.remaining;
        run_fill(&mut ctx, &mut |p: &FillProgress<'_>| {
            assert!(p.remaining < last, "remaining must strictly decrease");
            last = p.remaining;
        })
        .unwrap();

        assert_eq!(ctx.remaining, 0);
        assert!(ctx.source.iter().all(|&s| s > 0));
        // Confidence stays a valid evidence measure after the run.
        for &c in &ctx.confidence {
            assert!(c > 0.0 && c <= 1.0, "confidence out of range: {}", c);
        }
    }
}
