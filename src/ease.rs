#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ease {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
}

impl Ease {
    /// Resolves the camelCase names used in keyframe declarations.
    /// Unknown names are a soft condition; callers fall back to linear.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Self::Linear),
            "easeInQuad" => Some(Self::InQuad),
            "easeOutQuad" => Some(Self::OutQuad),
            "easeInOutQuad" => Some(Self::InOutQuad),
            "easeInCubic" => Some(Self::InCubic),
            "easeOutCubic" => Some(Self::OutCubic),
            "easeInOutCubic" => Some(Self::InOutCubic),
            _ => None,
        }
    }

    pub fn from_name_or_linear(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::Linear)
    }

    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => t * (2.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    (t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0
                }
            }
        }
    }
}
