//! Keyframes and per-property tracks.
//!
//! A track's keys are kept sorted ascending by time. Sorting is always the
//! stable `sort_by(total_cmp)`, so keyframes sharing an exact time keep their
//! insertion order and a query at that time returns the first-inserted one.

use crate::{ease::Ease, value::Value};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe {
    /// Milliseconds, relative to the owning clip's start.
    pub time: f64,
    pub value: Value,
    /// Easing applied from this key toward the next.
    pub ease: Ease,
}

impl Keyframe {
    pub fn new(time: f64, value: impl Into<Value>, ease: Ease) -> Self {
        Self {
            time,
            value: value.into(),
            ease,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct KeyTrack {
    keys: Vec<Keyframe>,
    sorted: bool,
}

impl KeyTrack {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            sorted: true,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Append without re-sorting. Used inside a timeline batch; the sort is
    /// deferred to [`KeyTrack::finalize`].
    pub fn push_deferred(&mut self, kf: Keyframe) {
        let in_order = self
            .keys
            .last()
            .is_none_or(|last| last.time <= kf.time);
        self.keys.push(kf);
        if !in_order {
            self.sorted = false;
        }
    }

    /// Append and re-sort immediately.
    pub fn insert(&mut self, kf: Keyframe) {
        self.keys.push(kf);
        self.finalize();
    }

    /// Restores the time ordering. Stable, so same-time keys keep insertion
    /// order.
    pub fn finalize(&mut self) {
        self.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.sorted = true;
    }

    /// Resolves the track's value at `time` (clip-relative ms).
    ///
    /// Clamp to the first/last key outside the keyed range; an exact hit
    /// returns that key's value with no easing applied; otherwise the
    /// bracketing pair is found by binary search and interpolated at the
    /// eased progress.
    ///
    /// Returns `None` for an empty track.
    pub fn sample(&self, time: f64) -> Option<Value> {
        let first = self.keys.first()?;
        if time <= first.time {
            return Some(first.value.clone());
        }
        let last = self.keys.last()?;
        if time > last.time {
            return Some(last.value.clone());
        }

        // Narrow [low, high] to the bracketing pair. The strict comparison
        // leaves `high` at the lowest index whose time is >= the query, so
        // an exact hit among duplicates resolves to the first-inserted key.
        let mut low = 0usize;
        let mut high = self.keys.len() - 1;
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if self.keys[mid].time < time {
                low = mid;
            } else {
                high = mid;
            }
        }

        let prev = &self.keys[low];
        let next = &self.keys[high];
        if next.time == time {
            return Some(next.value.clone());
        }

        let span = next.time - prev.time;
        if span <= 0.0 {
            return Some(prev.value.clone());
        }
        let t = (time - prev.time) / span;
        let eased = prev.ease.apply(t);
        Some(Value::interpolate(&prev.value, &next.value, eased))
    }
}
