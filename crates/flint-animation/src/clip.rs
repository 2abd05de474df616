//! Animation clip decoding — quantized per-track rotation/translation/scale
//! streams with interpolation, event queries, and sync-respecting
//! root-motion sampling. Immutable after load per `§3`.

use crate::pose::{Pose, Transform};
use crate::root_motion::RootMotionData;
use crate::sync_track::SyncTrack;
use crate::time::FrameTime;
use flint_core::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Resource identifier for an `AnimationClip`, resolved through `GraphResources`.
pub type ClipId = String;

/// A per-axis quantization range: a sample `q` decodes to
/// `start + length * (q / 65535)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisRange {
    pub start: f32,
    pub length: f32,
}

impl AxisRange {
    pub fn encompassing(values: impl Iterator<Item = f32>) -> Self {
        let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
        for v in values {
            min = min.min(v);
            max = max.max(v);
        }
        if !min.is_finite() || !max.is_finite() {
            return Self { start: 0.0, length: 0.0 };
        }
        Self {
            start: min,
            length: (max - min).max(1e-6),
        }
    }

    pub fn encode(&self, value: f32) -> u16 {
        let t = ((value - self.start) / self.length).clamp(0.0, 1.0);
        (t * u16::MAX as f32).round() as u16
    }

    pub fn decode(&self, sample: u16) -> f32 {
        self.start + self.length * (sample as f32 / u16::MAX as f32)
    }
}

/// A quantized rotation sample: `x`/`y`/`z` linearly quantized over
/// `[-1, 1]`; `w` is reconstructed on decode (the clip canonicalizes so `w`
/// is non-negative before quantizing, so the reconstructed sign is unambiguous).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantizedRotation {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

const ROT_RANGE: AxisRange = AxisRange {
    start: -1.0,
    length: 2.0,
};

impl QuantizedRotation {
    pub fn quantize(q: Quat) -> Self {
        let q = if q.w < 0.0 {
            Quat::new(-q.x, -q.y, -q.z, -q.w)
        } else {
            q
        };
        Self {
            x: ROT_RANGE.encode(q.x),
            y: ROT_RANGE.encode(q.y),
            z: ROT_RANGE.encode(q.z),
        }
    }

    pub fn dequantize(&self) -> Quat {
        let x = ROT_RANGE.decode(self.x);
        let y = ROT_RANGE.decode(self.y);
        let z = ROT_RANGE.decode(self.z);
        let w_sq = (1.0 - x * x - y * y - z * z).max(0.0);
        Quat::new(x, y, z, w_sq.sqrt()).normalized()
    }
}

/// A rotation track: one quantized sample per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationTrack {
    pub samples: Vec<QuantizedRotation>,
}

impl RotationTrack {
    pub fn sample(&self, frame_time: FrameTime) -> Quat {
        if self.samples.is_empty() {
            return Quat::IDENTITY;
        }
        let i = (frame_time.frame_index as usize).min(self.samples.len() - 1);
        let j = (i + 1).min(self.samples.len() - 1);
        let a = self.samples[i].dequantize();
        let b = self.samples[j].dequantize();
        a.slerp(&b, frame_time.percentage_to_next)
    }
}

/// A translation or scale track: quantized per-axis samples, or a single
/// static sample for the whole clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorTrack {
    pub ranges: [AxisRange; 3],
    pub samples: Vec<[u16; 3]>,
    pub is_static: bool,
}

impl VectorTrack {
    fn decode(&self, sample: [u16; 3]) -> Vec3 {
        Vec3::new(
            self.ranges[0].decode(sample[0]),
            self.ranges[1].decode(sample[1]),
            self.ranges[2].decode(sample[2]),
        )
    }

    pub fn sample(&self, frame_time: FrameTime) -> Vec3 {
        if self.samples.is_empty() {
            return Vec3::ZERO;
        }
        if self.is_static {
            return self.decode(self.samples[0]);
        }
        let i = (frame_time.frame_index as usize).min(self.samples.len() - 1);
        let j = (i + 1).min(self.samples.len() - 1);
        let a = self.decode(self.samples[i]);
        let b = self.decode(self.samples[j]);
        a.lerp(&b, frame_time.percentage_to_next)
    }
}

/// Per-bone compressed tracks. Scale is optional; when absent, scale
/// defaults to `1` per `§4.2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoneTrack {
    pub rotation: RotationTrack,
    pub translation: VectorTrack,
    pub scale: Option<VectorTrack>,
}

/// A clip event: a time range (clip-relative percentages) plus an opaque
/// payload consumed by game logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipEvent {
    pub start_percentage: f32,
    pub end_percentage: f32,
    pub payload: String,
}

/// A fully decoded, immutable animation clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    pub num_frames: u32,
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
    /// Sorted by `start_percentage`.
    pub events: Vec<ClipEvent>,
    pub sync_track: SyncTrackDef,
    pub root_motion: RootMotionData,
    pub is_additive: bool,
}

/// Serializable sync-track definition; converted to a `SyncTrack` on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTrackDef {
    pub markers: Vec<crate::sync_track::EventMarker>,
}

impl AnimationClip {
    pub fn sync_track(&self) -> SyncTrack {
        SyncTrack::new(self.sync_track.markers.clone())
    }

    /// Decode every bone's local transform at `frame_time` into `out`.
    pub fn get_pose(&self, frame_time: FrameTime, out: &mut Pose) {
        for (i, track) in self.tracks.iter().enumerate() {
            if i >= out.bones.len() {
                break;
            }
            let rotation = track.rotation.sample(frame_time);
            let translation = track.translation.sample(frame_time);
            let scale = track
                .scale
                .as_ref()
                .map(|s| s.sample(frame_time))
                .unwrap_or(Vec3::ONE);
            out.bones[i] = Transform::new(translation, rotation, scale);
        }
        out.state = crate::pose::PoseState::Pose;
    }

    pub fn get_local_transform(&self, bone_index: usize, frame_time: FrameTime) -> Transform {
        let Some(track) = self.tracks.get(bone_index) else {
            return Transform::IDENTITY;
        };
        let rotation = track.rotation.sample(frame_time);
        let translation = track.translation.sample(frame_time);
        let scale = track
            .scale
            .as_ref()
            .map(|s| s.sample(frame_time))
            .unwrap_or(Vec3::ONE);
        Transform::new(translation, rotation, scale)
    }

    pub fn get_global_transform(
        &self,
        bone_index: usize,
        frame_time: FrameTime,
        parents: &[Option<usize>],
    ) -> Transform {
        let mut chain = Vec::new();
        let mut idx = Some(bone_index);
        while let Some(i) = idx {
            chain.push(i);
            idx = parents[i];
        }
        let mut global = Transform::IDENTITY;
        for &i in chain.iter().rev() {
            global = global.mul(&self.get_local_transform(i, frame_time));
        }
        global
    }

    fn frame_time_at(&self, percentage: f32) -> FrameTime {
        FrameTime::from_percentage(crate::time::Percentage::new(percentage), self.num_frames)
    }

    /// Events overlapping `[from, to]` (clip-relative percentages), appended
    /// in clip time order. Handles at most one loop by splitting into
    /// `[from, 1.0] ∪ [0.0, to]`.
    pub fn get_events_for_range(&self, from: f32, to: f32, out: &mut Vec<ClipEvent>) {
        if to >= from {
            self.append_overlapping(from, to, out);
        } else {
            self.append_overlapping(from, 1.0, out);
            self.append_overlapping(0.0, to, out);
        }
    }

    fn append_overlapping(&self, from: f32, to: f32, out: &mut Vec<ClipEvent>) {
        for ev in &self.events {
            if ev.end_percentage >= from && ev.start_percentage <= to {
                out.push(ev.clone());
            }
        }
    }

    /// Root-motion delta between two clip-relative percentages, with
    /// single-loop handling.
    pub fn get_root_motion_delta(&self, from: f32, to: f32) -> Transform {
        let from_ft = self.frame_time_at(from);
        let to_ft = self.frame_time_at(to);
        let start_ft = self.frame_time_at(0.0);
        let end_ft = self.frame_time_at(1.0);
        self.root_motion.delta(
            (from_ft.frame_index, from_ft.percentage_to_next),
            (to_ft.frame_index, to_ft.percentage_to_next),
            (start_ft.frame_index, start_ft.percentage_to_next),
            (end_ft.frame_index, end_ft.percentage_to_next),
        )
    }
}
