//! Directional gaussian blur over premultiplied RGBA8.
//!
//! The separable blur runs as two queued post passes (horizontal, then
//! vertical) so the ping-pong buffer chain composes them. Weights are
//! fixed-point Q16 and sum to exactly 1.0.

use crate::{
    error::{KinettaError, KinettaResult},
    raster::Surface,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

pub fn blur_pass(
    src: &Surface,
    dst: &mut Surface,
    radius: u32,
    sigma: f32,
    direction: BlurDirection,
) -> KinettaResult<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(KinettaError::render("blur pass surface size mismatch"));
    }
    if radius == 0 {
        dst.data.copy_from_slice(&src.data);
        return Ok(());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let k_radius = (kernel.len() / 2) as i32;
    let w = src.width as i32;
    let h = src.height as i32;

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in kernel.iter().enumerate() {
                let offset = ki as i32 - k_radius;
                let (sx, sy) = match direction {
                    BlurDirection::Horizontal => ((x + offset).clamp(0, w - 1), y),
                    BlurDirection::Vertical => (x, (y + offset).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src.data[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst.data[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
    Ok(())
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> KinettaResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(KinettaError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;

    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(KinettaError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }

    // Push any rounding residue into the center tap so the weights stay
    // normalized.
    let delta = 65536i64 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let new_mid = (i64::from(weights[mid]) + delta).clamp(0, 65536);
        weights[mid] = new_mid as u32;
    }

    Ok(weights)
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + 32768) >> 16;
    v.min(255) as u8
}
