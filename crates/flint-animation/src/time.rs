//! Time representations used across the graph evaluator.
//!
//! A clip position can be expressed either as raw seconds, as a percentage
//! through a clip's duration, or as a `FrameTime` (an integer frame plus the
//! fractional position to the next frame) for sampling.

use serde::{Deserialize, Serialize};

/// Seconds elapsed, always `>= 0`.
pub type Seconds = f32;

/// Normalized position through a clip, typically in `[0, 1]` but callers may
/// pass values outside that range before clamping/wrapping.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(pub f32);

impl Percentage {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    pub fn new(value: f32) -> Self {
        Self(value)
    }

    /// Wrap into `[0, 1)`, counting how many times it wrapped.
    pub fn wrapped(self) -> (Self, i32) {
        if self.0.is_finite() == false {
            return (Self::ZERO, 0);
        }
        let wraps = self.0.floor();
        let mut frac = self.0 - wraps;
        // floor() of a negative value already moves toward -inf, so frac is in [0,1)
        if frac >= 1.0 {
            frac -= 1.0;
        }
        (Self(frac), wraps as i32)
    }

    pub fn clamped(self) -> Self {
        Self(self.0.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

/// A frame index plus the fractional percentage toward the next frame,
/// used when sampling quantized keyframe tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTime {
    pub frame_index: u32,
    pub percentage_to_next: f32,
}

impl FrameTime {
    pub fn new(frame_index: u32, percentage_to_next: f32) -> Self {
        Self {
            frame_index,
            percentage_to_next: percentage_to_next.clamp(0.0, 1.0),
        }
    }

    /// Derive a `FrameTime` from a clip-relative percentage and a frame count.
    pub fn from_percentage(percentage: Percentage, num_frames: u32) -> Self {
        if num_frames <= 1 {
            return Self::new(0, 0.0);
        }
        let clamped = percentage.clamped().value();
        let num_intervals = (num_frames - 1) as f32;
        let scaled = clamped * num_intervals;
        let frame_index = (scaled.floor() as u32).min(num_frames - 2);
        let percentage_to_next = scaled - frame_index as f32;
        Self::new(frame_index, percentage_to_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_wraps_forward() {
        let (p, wraps) = Percentage::new(1.3).wrapped();
        assert!((p.value() - 0.3).abs() < 1e-5);
        assert_eq!(wraps, 1);
    }

    #[test]
    fn percentage_wraps_backward() {
        let (p, wraps) = Percentage::new(-0.2).wrapped();
        assert!((p.value() - 0.8).abs() < 1e-5);
        assert_eq!(wraps, -1);
    }

    #[test]
    fn percentage_clamps() {
        assert_eq!(Percentage::new(1.5).clamped().value(), 1.0);
        assert_eq!(Percentage::new(-0.5).clamped().value(), 0.0);
    }

    #[test]
    fn frame_time_from_percentage_midpoint() {
        let ft = FrameTime::from_percentage(Percentage::new(0.5), 3);
        assert_eq!(ft.frame_index, 1);
        assert!(ft.percentage_to_next.abs() < 1e-5);
    }

    #[test]
    fn frame_time_clamps_last_frame() {
        let ft = FrameTime::from_percentage(Percentage::new(1.0), 3);
        assert_eq!(ft.frame_index, 1);
        assert!((ft.percentage_to_next - 1.0).abs() < 1e-5);
    }
}
