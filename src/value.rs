//! Animatable values and the type-aware interpolation between them.

/// Straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
            let a = f64::from(a);
            let b = f64::from(b);
            (a + (b - a) * t).round().clamp(0.0, 255.0) as u8
        }

        Self {
            r: lerp_u8(a.r, b.r, t),
            g: lerp_u8(a.g, b.g, t),
            b: lerp_u8(a.b, b.b, t),
            a: lerp_u8(a.a, b.a, t),
        }
    }

    /// CSS-style hex notation, `#rrggbb` or `#rrggbbaa`.
    pub fn css_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

pub fn lerp_f64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// A keyframeable value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Number(f64),
    Color(Rgba8),
    Point { x: f64, y: f64 },
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgba8> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// Type-aware interpolation at eased progress `t`.
    ///
    /// Numbers and points lerp linearly, colors lerp per channel. Every other
    /// pairing (text, mismatched tags) holds `a` until `t >= 1`, then snaps
    /// to `b`.
    pub fn interpolate(a: &Value, b: &Value, t: f64) -> Value {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(lerp_f64(*x, *y, t)),
            (Value::Color(x), Value::Color(y)) => Value::Color(Rgba8::lerp(*x, *y, t)),
            (Value::Point { x: ax, y: ay }, Value::Point { x: bx, y: by }) => Value::Point {
                x: lerp_f64(*ax, *bx, t),
                y: lerp_f64(*ay, *by, t),
            },
            _ => {
                if t >= 1.0 {
                    b.clone()
                } else {
                    a.clone()
                }
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Rgba8> for Value {
    fn from(c: Rgba8) -> Self {
        Self::Color(c)
    }
}
