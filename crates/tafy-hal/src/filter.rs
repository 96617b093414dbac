//! [`MedianWindow`] – fixed-size circular window with a median over the
//! valid (non-zero) entries.
//!
//! A zero marks a rejected sample. Rejected samples still occupy a slot so a
//! run of bad readings ages good ones out of the window.

pub const WINDOW_LEN: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct MedianWindow {
    slots: [f32; WINDOW_LEN],
    next: usize,
}

impl MedianWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the oldest slot.
    pub fn push(&mut self, sample: f32) {
        self.slots[self.next] = sample;
        self.next = (self.next + 1) % WINDOW_LEN;
    }

    pub fn valid_len(&self) -> usize {
        self.slots.iter().filter(|s| **s > 0.0).count()
    }

    /// Median of the valid entries; the mean of the middle pair for an even
    /// count. `None` when no entry is valid.
    pub fn median(&self) -> Option<f32> {
        let mut valid: Vec<f32> = self.slots.iter().copied().filter(|s| *s > 0.0).collect();
        if valid.is_empty() {
            return None;
        }
        valid.sort_by(f32::total_cmp);
        let mid = valid.len() / 2;
        if valid.len() % 2 == 1 {
            Some(valid[mid])
        } else {
            Some((valid[mid - 1] + valid[mid]) / 2.0)
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
