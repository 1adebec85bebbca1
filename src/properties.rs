//! Per-clip property schema.
//!
//! The transform/compositing properties every clip carries are named struct
//! fields; everything else (per-kind extras like `volume`, custom user
//! properties, nested dot-paths) lives in an explicit extension map declared
//! at construction time. Keyframing an undeclared property is a fail-fast
//! validation error.

use std::collections::BTreeMap;

use crate::{
    error::{KinettaError, KinettaResult},
    value::Value,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PropertyBag {
    pub x: f64,
    pub y: f64,
    /// Radians.
    pub rotation: f64,
    pub scale: f64,
    /// 0..=1.
    pub opacity: f64,
    extra: BTreeMap<String, Value>,
}

impl Default for PropertyBag {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale: 1.0,
            opacity: 1.0,
            extra: BTreeMap::new(),
        }
    }
}

const BASE_NAMES: [&str; 5] = ["x", "y", "rotation", "scale", "opacity"];

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension property with its initial value. Overwrites a
    /// previous declaration of the same name.
    pub fn declare(&mut self, name: impl Into<String>, initial: impl Into<Value>) {
        self.extra.insert(name.into(), initial.into());
    }

    /// Schema membership: base fields plus declared extension keys. Dot-paths
    /// are members when their root segment is declared.
    pub fn contains(&self, name: &str) -> bool {
        if BASE_NAMES.contains(&name) {
            return true;
        }
        let root = name.split('.').next().unwrap_or(name);
        self.extra.contains_key(root) || self.extra.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "x" => return Some(Value::Number(self.x)),
            "y" => return Some(Value::Number(self.y)),
            "rotation" => return Some(Value::Number(self.rotation)),
            "scale" => return Some(Value::Number(self.scale)),
            "opacity" => return Some(Value::Number(self.opacity)),
            _ => {}
        }

        if let Some(v) = self.extra.get(name) {
            return Some(v.clone());
        }

        // Dot-path into a point-valued extension property, e.g. "offset.x".
        let (root, leaf) = name.rsplit_once('.')?;
        match self.extra.get(root)? {
            Value::Point { x, y } => match leaf {
                "x" => Some(Value::Number(*x)),
                "y" => Some(Value::Number(*y)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: Value) -> KinettaResult<()> {
        let want_number = |v: &Value| {
            v.as_number().ok_or_else(|| {
                KinettaError::validation(format!("property '{name}' expects a number"))
            })
        };

        match name {
            "x" => {
                self.x = want_number(&value)?;
                return Ok(());
            }
            "y" => {
                self.y = want_number(&value)?;
                return Ok(());
            }
            "rotation" => {
                self.rotation = want_number(&value)?;
                return Ok(());
            }
            "scale" => {
                self.scale = want_number(&value)?;
                return Ok(());
            }
            "opacity" => {
                self.opacity = want_number(&value)?;
                return Ok(());
            }
            _ => {}
        }

        if self.extra.contains_key(name) {
            self.extra.insert(name.to_string(), value);
            return Ok(());
        }

        if let Some((root, leaf)) = name.rsplit_once('.')
            && let Some(Value::Point { x, y }) = self.extra.get(root)
        {
            let n = want_number(&value)?;
            let (mut x, mut y) = (*x, *y);
            match leaf {
                "x" => x = n,
                "y" => y = n,
                _ => {
                    return Err(KinettaError::validation(format!(
                        "unknown point component '{leaf}' in property '{name}'"
                    )));
                }
            }
            self.extra.insert(root.to_string(), Value::Point { x, y });
            return Ok(());
        }

        Err(KinettaError::validation(format!(
            "'{name}' is not a declared property of this clip"
        )))
    }

    /// Restores every field from the deep-copied construction snapshot. Runs
    /// at the top of each frame so keyframes and effects re-apply
    /// non-destructively.
    pub fn reset_from(&mut self, initial: &PropertyBag) {
        self.x = initial.x;
        self.y = initial.y;
        self.rotation = initial.rotation;
        self.scale = initial.scale;
        self.opacity = initial.opacity;
        self.extra.clone_from(&initial.extra);
    }

    pub fn number_or(&self, name: &str, fallback: f64) -> f64 {
        self.get(name).and_then(|v| v.as_number()).unwrap_or(fallback)
    }
}
