// ============================================================================
// PIXEL KERNELS — luminance, Scharr derivatives, 3×3 correlation
// ============================================================================
//
// Shared primitives for the fill engine. All kernels sample clamp-to-edge,
// and the per-row loops run in parallel via rayon; every pass is elementwise
// and therefore deterministic regardless of thread count.

use image::RgbaImage;
use rayon::prelude::*;

/// Scharr 3×3 horizontal-derivative kernel.
const SCHARR_X: [f32; 9] = [-3.0, 0.0, 3.0, -10.0, 0.0, 10.0, -3.0, 0.0, 3.0];

/// Scharr 3×3 vertical-derivative kernel (transpose of [`SCHARR_X`]).
const SCHARR_Y: [f32; 9] = [-3.0, -10.0, -3.0, 0.0, 0.0, 0.0, 3.0, 10.0, 3.0];

/// Collapse an RGBA image to a u8 luminance plane.
/// Uses the BT.709 luminance weights: 0.2126 R + 0.7152 G + 0.0722 B.
pub fn luminance_plane(image: &RgbaImage) -> Vec<u8> {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src = image.as_raw();
    let mut out = vec![0u8; w * h];

    out.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &src[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let pi = x * 4;
            let r = row_in[pi] as f32;
            let g = row_in[pi + 1] as f32;
            let b = row_in[pi + 2] as f32;
            row_out[x] = (0.2126 * r + 0.7152 * g + 0.0722 * b)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    });

    out
}

/// Correlate a scalar grid with a 3×3 kernel, clamping samples to the
/// grid edges. Kernel entries are laid out row-major, top-left first.
pub fn correlate3x3(src: &[f32], width: usize, height: usize, kernel: &[f32; 9]) -> Vec<f32> {
    debug_assert_eq!(src.len(), width * height);
    let mut out = vec![0.0f32; width * height];

    out.par_chunks_mut(width).enumerate().for_each(|(y, row_out)| {
        for x in 0..width {
            let mut acc = 0.0f32;
            for ky in 0..3isize {
                let sy = (y as isize + ky - 1).clamp(0, height as isize - 1) as usize;
                let row = &src[sy * width..(sy + 1) * width];
                for kx in 0..3isize {
                    let sx = (x as isize + kx - 1).clamp(0, width as isize - 1) as usize;
                    acc += row[sx] * kernel[(ky * 3 + kx) as usize];
                }
            }
            row_out[x] = acc;
        }
    });

    out
}

/// Per-pixel |∂/∂x| and |∂/∂y| of a luminance plane via the Scharr operator.
///
/// Responses are saturated to 255 before scaling, so each output lies in
/// [0, 1]. High-contrast edges clip rather than dominate the data term.
pub fn scharr_gradients(luma: &[u8], width: usize, height: usize) -> (Vec<f32>, Vec<f32>) {
    let plane: Vec<f32> = luma.iter().map(|&v| v as f32).collect();

    let mut gx = correlate3x3(&plane, width, height, &SCHARR_X);
    let mut gy = correlate3x3(&plane, width, height, &SCHARR_Y);
    for v in &mut gx {
        *v = v.abs().min(255.0) / 255.0;
    }
    for v in &mut gy {
        *v = v.abs().min(255.0) / 255.0;
    }

    (gx, gy)
}
