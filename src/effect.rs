//! Clip effects.
//!
//! An effect owns a clip-relative time window. CPU effects mutate the clip's
//! property bag while the window is active; post effects are picked up by the
//! render engine and run as full-frame passes after scene composition.

use crate::{
    error::{KinettaError, KinettaResult},
    properties::PropertyBag,
    value::lerp_f64,
};

#[derive(Clone, Debug, PartialEq)]
pub enum EffectKind {
    FadeIn,
    FadeOut,
    Wiggle { frequency: f64, amplitude: f64, seed: u64 },
    Blur { radius_px: u32, sigma: f64 },
    BrightnessContrast { brightness: f64, contrast: f64 },
    Invert,
}

impl EffectKind {
    /// Post effects render as full-frame passes instead of touching clip
    /// properties.
    pub fn is_post(&self) -> bool {
        matches!(
            self,
            Self::Blur { .. } | Self::BrightnessContrast { .. } | Self::Invert
        )
    }
}

/// An effect instance bound to a clip-relative window `[start, start + duration)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Effect {
    pub start: f64,
    pub duration: f64,
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(start: f64, duration: f64, kind: EffectKind) -> KinettaResult<Self> {
        if !start.is_finite() || start < 0.0 {
            return Err(KinettaError::validation(
                "effect start must be finite and >= 0",
            ));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(KinettaError::validation(
                "effect duration must be finite and > 0",
            ));
        }
        Ok(Self { start, duration, kind })
    }

    /// Window progress at clip-relative `time_ms`, clamped to `[0, 1]`.
    pub fn progress(&self, time_ms: f64) -> f64 {
        ((time_ms - self.start) / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_active(&self, time_ms: f64) -> bool {
        time_ms >= self.start && time_ms < self.start + self.duration
    }

    /// Applies a CPU effect to the clip's properties at clip-relative
    /// `time_ms`. Post effects are a no-op here.
    pub fn apply_to(&self, props: &mut PropertyBag, time_ms: f64) {
        match &self.kind {
            EffectKind::FadeIn => {
                if self.is_active(time_ms) {
                    props.opacity *= self.progress(time_ms);
                }
            }
            EffectKind::FadeOut => {
                if self.is_active(time_ms) {
                    props.opacity *= 1.0 - self.progress(time_ms);
                }
            }
            EffectKind::Wiggle {
                frequency,
                amplitude,
                seed,
            } => {
                if !self.is_active(time_ms) {
                    return;
                }
                let t = time_ms / 1000.0 * frequency;
                props.x += noise_signed(*seed, t) * amplitude;
                props.y += noise_signed(seed.wrapping_add(0x51CE), t) * amplitude;
            }
            EffectKind::Blur { .. }
            | EffectKind::BrightnessContrast { .. }
            | EffectKind::Invert => {}
        }
    }
}

pub fn parse_fade_in(_params: &serde_json::Value) -> KinettaResult<EffectKind> {
    Ok(EffectKind::FadeIn)
}

pub fn parse_fade_out(_params: &serde_json::Value) -> KinettaResult<EffectKind> {
    Ok(EffectKind::FadeOut)
}

pub fn parse_wiggle(params: &serde_json::Value) -> KinettaResult<EffectKind> {
    let frequency = get_f64(params, "frequency")?;
    if frequency <= 0.0 {
        return Err(KinettaError::validation("Wiggle.frequency must be > 0"));
    }
    let amplitude = get_f64(params, "amplitude")?;
    if amplitude < 0.0 {
        return Err(KinettaError::validation("Wiggle.amplitude must be >= 0"));
    }
    let seed = match params.get("seed") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| KinettaError::validation("Wiggle.seed must be an integer"))?,
        None => 0,
    };
    Ok(EffectKind::Wiggle { frequency, amplitude, seed })
}

pub fn parse_blur(params: &serde_json::Value) -> KinettaResult<EffectKind> {
    let radius_px = get_u32(params, "radius_px")?;
    if radius_px > 256 {
        return Err(KinettaError::validation("Blur.radius_px must be <= 256"));
    }
    let sigma = match params.get("sigma") {
        Some(v) => {
            let s = v
                .as_f64()
                .ok_or_else(|| KinettaError::validation("Blur.sigma must be a number"))?;
            if !s.is_finite() || s <= 0.0 {
                return Err(KinettaError::validation("Blur.sigma must be finite and > 0"));
            }
            s
        }
        None => f64::from(radius_px) / 2.0,
    };
    Ok(EffectKind::Blur { radius_px, sigma })
}

pub fn parse_brightness_contrast(params: &serde_json::Value) -> KinettaResult<EffectKind> {
    let brightness = get_f64(params, "brightness")?;
    if !(-1.0..=1.0).contains(&brightness) {
        return Err(KinettaError::validation(
            "BrightnessContrast.brightness must be in [-1, 1]",
        ));
    }
    let contrast = get_f64(params, "contrast")?;
    if !(-1.0..=1.0).contains(&contrast) {
        return Err(KinettaError::validation(
            "BrightnessContrast.contrast must be in [-1, 1]",
        ));
    }
    Ok(EffectKind::BrightnessContrast { brightness, contrast })
}

pub fn parse_invert(_params: &serde_json::Value) -> KinettaResult<EffectKind> {
    Ok(EffectKind::Invert)
}

/// Smooth value noise in `[-1, 1]` over a seeded integer lattice.
pub fn noise_signed(seed: u64, t: f64) -> f64 {
    noise01(seed, t) * 2.0 - 1.0
}

/// Smooth value noise in `[0, 1]`.
pub fn noise01(seed: u64, t: f64) -> f64 {
    let i = t.floor();
    let frac = t - i;
    let i = i as i64;
    let a = lattice01(seed, i);
    let b = lattice01(seed, i + 1);
    let s = frac * frac * (3.0 - 2.0 * frac);
    lerp_f64(a, b, s)
}

fn lattice01(seed: u64, i: i64) -> f64 {
    let h = splitmix64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    ((h >> 11) as f64) / ((1u64 << 53) as f64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn get_f64(params: &serde_json::Value, key: &str) -> KinettaResult<f64> {
    let Some(v) = params.get(key) else {
        return Err(KinettaError::validation(format!(
            "missing effect param '{key}'"
        )));
    };
    let Some(n) = v.as_f64() else {
        return Err(KinettaError::validation(format!(
            "effect param '{key}' must be a number"
        )));
    };
    if !n.is_finite() {
        return Err(KinettaError::validation(format!(
            "effect param '{key}' must be finite"
        )));
    }
    Ok(n)
}

fn get_u32(params: &serde_json::Value, key: &str) -> KinettaResult<u32> {
    let Some(v) = params.get(key) else {
        return Err(KinettaError::validation(format!(
            "missing effect param '{key}'"
        )));
    };
    let Some(n) = v.as_u64() else {
        return Err(KinettaError::validation(format!(
            "effect param '{key}' must be an integer"
        )));
    };
    u32::try_from(n)
        .map_err(|_| KinettaError::validation(format!("effect param '{key}' is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_ramps_opacity_over_window() {
        let fx = Effect::new(1000.0, 500.0, EffectKind::FadeIn).unwrap();

        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 1000.0);
        assert_eq!(props.opacity, 0.0);

        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 1250.0);
        assert!((props.opacity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fade_out_inverts_the_ramp() {
        let fx = Effect::new(0.0, 1000.0, EffectKind::FadeOut).unwrap();

        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 250.0);
        assert!((props.opacity - 0.75).abs() < 1e-9);

        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 900.0);
        assert!((props.opacity - 0.1).abs() < 1e-9);
    }

    #[test]
    fn fade_in_leaves_opacity_alone_before_its_window() {
        let fx = Effect::new(1000.0, 500.0, EffectKind::FadeIn).unwrap();
        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 500.0);
        assert_eq!(props.opacity, 1.0);
    }

    #[test]
    fn fade_out_leaves_opacity_alone_after_its_window() {
        let fx = Effect::new(0.0, 500.0, EffectKind::FadeOut).unwrap();
        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 2000.0);
        assert_eq!(props.opacity, 1.0);
    }

    #[test]
    fn fades_compose_multiplicatively() {
        let fade_in = Effect::new(0.0, 1000.0, EffectKind::FadeIn).unwrap();
        let fade_out = Effect::new(0.0, 1000.0, EffectKind::FadeOut).unwrap();

        let mut props = PropertyBag::default();
        fade_in.apply_to(&mut props, 500.0);
        fade_out.apply_to(&mut props, 500.0);
        assert!((props.opacity - 0.25).abs() < 1e-9);
    }

    #[test]
    fn wiggle_is_deterministic_and_bounded() {
        let fx = Effect::new(
            0.0,
            10_000.0,
            EffectKind::Wiggle {
                frequency: 2.0,
                amplitude: 5.0,
                seed: 7,
            },
        )
        .unwrap();

        let mut a = PropertyBag::default();
        let mut b = PropertyBag::default();
        fx.apply_to(&mut a, 1234.0);
        fx.apply_to(&mut b, 1234.0);
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
        assert!(a.x.abs() <= 5.0 && a.y.abs() <= 5.0);
    }

    #[test]
    fn wiggle_outside_window_leaves_properties_alone() {
        let fx = Effect::new(
            1000.0,
            500.0,
            EffectKind::Wiggle {
                frequency: 1.0,
                amplitude: 5.0,
                seed: 0,
            },
        )
        .unwrap();
        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 2000.0);
        assert_eq!(props.x, 0.0);
        assert_eq!(props.y, 0.0);
    }

    #[test]
    fn post_effects_do_not_touch_properties() {
        let fx = Effect::new(
            0.0,
            1000.0,
            EffectKind::Blur { radius_px: 4, sigma: 2.0 },
        )
        .unwrap();
        assert!(fx.kind.is_post());
        let mut props = PropertyBag::default();
        fx.apply_to(&mut props, 500.0);
        assert_eq!(props, PropertyBag::default());
    }

    #[test]
    fn parse_wiggle_requires_params() {
        let err = parse_wiggle(&serde_json::json!({ "frequency": 2.0 })).unwrap_err();
        assert!(err.to_string().contains("amplitude"));

        let kind = parse_wiggle(&serde_json::json!({
            "frequency": 2.0, "amplitude": 3.0, "seed": 42
        }))
        .unwrap();
        assert_eq!(
            kind,
            EffectKind::Wiggle {
                frequency: 2.0,
                amplitude: 3.0,
                seed: 42
            }
        );
    }

    #[test]
    fn parse_blur_defaults_sigma_from_radius() {
        let kind = parse_blur(&serde_json::json!({ "radius_px": 8 })).unwrap();
        assert_eq!(kind, EffectKind::Blur { radius_px: 8, sigma: 4.0 });
    }

    #[test]
    fn effect_rejects_bad_window() {
        assert!(Effect::new(-1.0, 100.0, EffectKind::FadeIn).is_err());
        assert!(Effect::new(0.0, 0.0, EffectKind::FadeIn).is_err());
    }

    #[test]
    fn noise_is_continuous_across_lattice_points() {
        let before = noise01(9, 2.0 - 1e-9);
        let at = noise01(9, 2.0);
        assert!((before - at).abs() < 1e-6);
    }
}
