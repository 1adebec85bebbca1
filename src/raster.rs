//! Premultiplied-RGBA8 surfaces, compositing primitives and the painter.
//!
//! All pixel math is fixed-point over premultiplied channels.

use kurbo::{Affine, Point, Rect};

use crate::error::{KinettaError, KinettaResult};
use crate::transition::WipeDir;

pub type PremulRgba8 = [u8; 4];

/// An off-screen pixel buffer. Premultiplied RGBA8, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn copy_from(&mut self, other: &Surface) -> KinettaResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(KinettaError::render("surface size mismatch in copy_from"));
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        self.data[idx..idx + 4].copy_from_slice(&px);
    }
}

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

pub fn crossfade_px(a: PremulRgba8, b: PremulRgba8, t: f32) -> PremulRgba8 {
    let t = t.clamp(0.0, 1.0);
    let tt = ((t * 255.0).round() as i32).clamp(0, 255) as u16;
    let it = 255u16 - tt;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255(u16::from(a[i]), it);
        let bv = mul_div255(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Blends surfaces `a` and `b` over `dst` through a directional wipe mask at
/// progress `t`. `soft_edge` is a fraction of the wipe axis blended with a
/// smoothstep ramp; 0 gives a hard edge.
pub fn wipe_over(
    dst: &mut Surface,
    a: &Surface,
    b: &Surface,
    t: f32,
    dir: WipeDir,
    soft_edge: f32,
) -> KinettaResult<()> {
    let (width, height) = (dst.width, dst.height);
    if a.width != width || a.height != height || b.width != width || b.height != height {
        return Err(KinettaError::render(
            "wipe_over expects surfaces of equal size",
        ));
    }

    let t = t.clamp(0.0, 1.0);
    let soft_edge = soft_edge.max(0.0);

    let axis_len = match dir {
        WipeDir::LeftToRight | WipeDir::RightToLeft => width as f32,
        WipeDir::TopToBottom | WipeDir::BottomToTop => height as f32,
    };
    let soft_px = soft_edge * axis_len;

    // The edge travels an extended span so the soft band fully enters and
    // leaves the frame at t=0 and t=1.
    let edge = t * (axis_len + 2.0 * soft_px) - soft_px;
    let a_edge = edge - soft_px;
    let b_edge = edge + soft_px;

    for y in 0..height {
        for x in 0..width {
            let pos = match dir {
                WipeDir::LeftToRight => x as f32,
                WipeDir::RightToLeft => (width - 1 - x) as f32,
                WipeDir::TopToBottom => y as f32,
                WipeDir::BottomToTop => (height - 1 - y) as f32,
            };

            let m = if soft_px <= 0.0 {
                if pos < edge { 1.0 } else { 0.0 }
            } else {
                1.0 - smoothstep(a_edge, b_edge, pos)
            };

            let blended = crossfade_px(a.pixel(x, y), b.pixel(x, y), m);
            let out = over(dst.pixel(x, y), blended, 1.0);
            dst.put_pixel(x, y, out);
        }
    }
    Ok(())
}

fn smoothstep(a: f32, b: f32, x: f32) -> f32 {
    if x <= a {
        return 0.0;
    }
    if x >= b {
        return 1.0;
    }
    let t = (x - a) / (b - a);
    (t * t * (3.0 - 2.0 * t)).clamp(0.0, 1.0)
}

pub fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// A prepared, reusable premultiplied sprite.
#[derive(Clone, Debug)]
pub struct Sprite {
    pub width: u32,
    pub height: u32,
    pub data: std::sync::Arc<Vec<u8>>,
}

impl Sprite {
    pub fn from_premul(width: u32, height: u32, data: Vec<u8>) -> KinettaResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| KinettaError::render("sprite size overflow"))?;
        if data.len() != expected {
            return Err(KinettaError::render(
                "sprite data must match width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data: std::sync::Arc::new(data),
        })
    }

    fn sample_bilinear(&self, x: f64, y: f64) -> PremulRgba8 {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        if x < -1.0 || y < -1.0 || x > self.width as f64 || y > self.height as f64 {
            return [0; 4];
        }

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let fetch = |ix: i64, iy: i64| -> [f64; 4] {
            if ix < 0 || iy < 0 || ix >= i64::from(self.width) || iy >= i64::from(self.height) {
                return [0.0; 4];
            }
            let idx = ((iy as usize) * (self.width as usize) + (ix as usize)) * 4;
            [
                f64::from(self.data[idx]),
                f64::from(self.data[idx + 1]),
                f64::from(self.data[idx + 2]),
                f64::from(self.data[idx + 3]),
            ]
        };

        let x0i = x0 as i64;
        let y0i = y0 as i64;
        let p00 = fetch(x0i, y0i);
        let p10 = fetch(x0i + 1, y0i);
        let p01 = fetch(x0i, y0i + 1);
        let p11 = fetch(x0i + 1, y0i + 1);

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] + (p10[c] - p00[c]) * fx;
            let bot = p01[c] + (p11[c] - p01[c]) * fx;
            out[c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// Draws into a [`Surface`] through an affine transform stack.
///
/// Clip renders push one state and translate/rotate/scale; the render engine
/// performs the matching pop. An unbalanced stack corrupts every later draw
/// in the frame, so `pop` on an empty stack is an error rather than a no-op.
pub struct Painter<'a> {
    target: &'a mut Surface,
    stack: Vec<PainterState>,
    current: PainterState,
}

#[derive(Clone, Copy, Debug)]
struct PainterState {
    transform: Affine,
    alpha: f32,
}

impl Default for PainterState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
        }
    }
}

impl<'a> Painter<'a> {
    pub fn new(target: &'a mut Surface) -> Self {
        Self {
            target,
            stack: Vec::new(),
            current: PainterState::default(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self) {
        self.stack.push(self.current);
    }

    pub fn pop(&mut self) -> KinettaResult<()> {
        self.current = self
            .stack
            .pop()
            .ok_or_else(|| KinettaError::render("painter pop without matching push"))?;
        Ok(())
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        self.current.transform *= Affine::translate((x, y));
    }

    pub fn rotate(&mut self, radians: f64) {
        self.current.transform *= Affine::rotate(radians);
    }

    pub fn scale(&mut self, factor: f64) {
        self.current.transform *= Affine::scale(factor);
    }

    pub fn mul_alpha(&mut self, alpha: f64) {
        self.current.alpha *= alpha.clamp(0.0, 1.0) as f32;
    }

    /// Draws `sprite` centered on the local origin through the current
    /// transform, inverse-mapping destination pixels with bilinear sampling.
    pub fn draw_sprite(&mut self, sprite: &Sprite) -> KinettaResult<()> {
        if self.current.alpha <= 0.0 || sprite.width == 0 || sprite.height == 0 {
            return Ok(());
        }

        let (hw, hh) = (sprite.width as f64 / 2.0, sprite.height as f64 / 2.0);
        let local = Rect::new(-hw, -hh, hw, hh);
        let bounds = self.current.transform.transform_rect_bbox(local);

        let x0 = bounds.x0.floor().max(0.0) as u32;
        let y0 = bounds.y0.floor().max(0.0) as u32;
        let x1 = (bounds.x1.ceil().max(0.0) as u32).min(self.target.width);
        let y1 = (bounds.y1.ceil().max(0.0) as u32).min(self.target.height);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let inv = self.current.transform.inverse();
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                let src_pt = inv * center;
                let sx = src_pt.x + hw - 0.5;
                let sy = src_pt.y + hh - 0.5;
                let px = sprite.sample_bilinear(sx, sy);
                if px[3] == 0 {
                    continue;
                }
                let blended = over(self.target.pixel(x, y), px, self.current.alpha);
                self.target.put_pixel(x, y, blended);
            }
        }
        Ok(())
    }
}
