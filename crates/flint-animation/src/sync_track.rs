//! Sync track — an event-indexed normalization of a clip's timeline that lets
//! arbitrary pose sources be time-aligned by event rather than by raw time.

use crate::time::Percentage;
use serde::{Deserialize, Serialize};

/// A single event marker on a sync track. `start_percentage` is the clip
/// position (in `[0,1]`) at which the event begins; `duration` is its share
/// of the timeline and all durations on a track sum to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    pub id: u32,
    pub start_percentage: f32,
    pub duration: f32,
}

/// A position on a sync track: the event index plus the percentage through
/// that event's span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTrackTime {
    pub event_index: usize,
    pub percentage_through_event: f32,
}

impl SyncTrackTime {
    pub fn new(event_index: usize, percentage_through_event: f32) -> Self {
        Self {
            event_index,
            percentage_through_event,
        }
    }
}

/// A range between two sync-track times. `end >= start` in unwrapped event
/// axis coordinates; at most one wraparound is supported per `§4.1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTrackTimeRange {
    pub start: SyncTrackTime,
    pub end: SyncTrackTime,
}

/// An ordered, non-overlapping sequence of event markers covering one loop
/// of a clip's timeline. The last marker is duplicated at `1.0` internally
/// to simplify wraparound queries.
#[derive(Debug, Clone)]
pub struct SyncTrack {
    markers: Vec<EventMarker>,
}

impl SyncTrack {
    /// Build a sync track from markers whose durations should sum to `1.0`.
    /// A zero-duration or empty input falls back to a singleton event
    /// spanning the whole timeline, per `§4.1`'s edge-case rule.
    pub fn new(markers: Vec<EventMarker>) -> Self {
        if markers.is_empty() || markers.iter().map(|m| m.duration).sum::<f32>() <= 0.0 {
            return Self {
                markers: vec![EventMarker {
                    id: 0,
                    start_percentage: 0.0,
                    duration: 1.0,
                }],
            };
        }
        Self { markers }
    }

    pub fn num_events(&self) -> usize {
        self.markers.len()
    }

    pub fn markers(&self) -> &[EventMarker] {
        &self.markers
    }

    fn marker(&self, index: usize) -> EventMarker {
        self.markers[index % self.markers.len()]
    }

    /// Convert a clip percentage (wrapped into `[0,1)`) into a `SyncTrackTime`.
    pub fn get_time(&self, percentage: Percentage) -> SyncTrackTime {
        let (wrapped, _) = percentage.wrapped();
        let p = wrapped.value();
        for (i, marker) in self.markers.iter().enumerate() {
            let end = marker.start_percentage + marker.duration;
            if p < end || i == self.markers.len() - 1 {
                let span = marker.duration.max(1e-8);
                let through = ((p - marker.start_percentage) / span).clamp(0.0, 1.0);
                return SyncTrackTime::new(i, through);
            }
        }
        SyncTrackTime::new(self.markers.len() - 1, 1.0)
    }

    /// Inverse of `get_time`: convert a `SyncTrackTime` back to a clip
    /// percentage.
    pub fn get_percentage_through(&self, time: SyncTrackTime) -> Percentage {
        let marker = self.marker(time.event_index);
        Percentage::new(marker.start_percentage + marker.duration * time.percentage_through_event)
    }

    /// Nudge a `SyncTrackTime` by re-deriving its percentage-through-event
    /// after the event index wrapped around the track (used when a
    /// transition keeps an event index across differently-shaped tracks).
    pub fn adjust_percentage_through_event(&self, event_index: usize, delta: f32) -> SyncTrackTime {
        let idx = event_index % self.markers.len();
        let mut through = self.marker(idx).duration.max(1e-8);
        through = delta / through;
        SyncTrackTime::new(idx, through.clamp(0.0, 1.0))
    }

    /// Signed measure of how much of the event axis a range covers, with
    /// wraparound support.
    pub fn calculate_percentage_covered(&self, range: SyncTrackTimeRange) -> f32 {
        let start = self.get_percentage_through(range.start).value();
        let end = self.get_percentage_through(range.end).value();
        if end >= start {
            end - start
        } else {
            (1.0 - start) + end
        }
    }

    /// Blend two sync tracks at weight `t`. The result's marker count is
    /// `max(|a|, |b|)`, pairwise interpolating IDs (taking `a`'s when the
    /// weight favors it) and durations/starts.
    pub fn blend(a: &SyncTrack, b: &SyncTrack, t: f32) -> SyncTrack {
        let t = t.clamp(0.0, 1.0);
        let count = a.num_events().max(b.num_events());
        let mut markers = Vec::with_capacity(count);
        let mut cursor = 0.0f32;
        for i in 0..count {
            let ma = a.marker(i);
            let mb = b.marker(i);
            let duration = ma.duration + (mb.duration - ma.duration) * t;
            let id = if t < 0.5 { ma.id } else { mb.id };
            markers.push(EventMarker {
                id,
                start_percentage: cursor,
                duration,
            });
            cursor += duration;
        }
        // Renormalize in case of rounding drift.
        if cursor > 0.0 {
            for m in &mut markers {
                m.start_percentage /= cursor;
                m.duration /= cursor;
            }
        }
        SyncTrack::new(markers)
    }
}

/// The synchronized clip duration for a blended pair of sources, weighting
/// each source's duration by how much of the blended event axis it
/// contributes, per `§4.1`.
pub fn calculate_duration_synchronized(
    duration_a: f32,
    duration_b: f32,
    num_events_a: usize,
    num_events_b: usize,
    num_events_blended: usize,
    t: f32,
) -> f32 {
    if num_events_blended == 0 {
        return duration_a + (duration_b - duration_a) * t;
    }
    let per_event_a = if num_events_a > 0 {
        duration_a / num_events_a as f32
    } else {
        duration_a
    };
    let per_event_b = if num_events_b > 0 {
        duration_b / num_events_b as f32
    } else {
        duration_b
    };
    let per_event_blended = per_event_a + (per_event_b - per_event_a) * t;
    per_event_blended * num_events_blended as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_track(n: usize) -> SyncTrack {
        let dur = 1.0 / n as f32;
        let markers = (0..n)
            .map(|i| EventMarker {
                id: i as u32,
                start_percentage: i as f32 * dur,
                duration: dur,
            })
            .collect();
        SyncTrack::new(markers)
    }

    #[test]
    fn get_time_roundtrips_through_percentage() {
        let track = even_track(4);
        let p = Percentage::new(0.3);
        let t = track.get_time(p);
        let back = track.get_percentage_through(t);
        assert!((back.value() - p.value()).abs() < 1e-5);
    }

    #[test]
    fn zero_duration_track_falls_back_to_singleton() {
        let track = SyncTrack::new(vec![]);
        assert_eq!(track.num_events(), 1);
        let t = track.get_time(Percentage::new(0.7));
        assert_eq!(t.event_index, 0);
        assert!((t.percentage_through_event - 0.7).abs() < 1e-5);
    }

    #[test]
    fn self_blend_is_identity() {
        let track = even_track(3);
        let blended = SyncTrack::blend(&track, &track, 0.5);
        assert_eq!(blended.num_events(), track.num_events());
        for (a, b) in track.markers().iter().zip(blended.markers().iter()) {
            assert!((a.duration - b.duration).abs() < 1e-4);
            assert!((a.start_percentage - b.start_percentage).abs() < 1e-4);
        }
    }

    #[test]
    fn blend_marker_count_is_max_of_inputs() {
        let a = even_track(2);
        let b = even_track(5);
        let blended = SyncTrack::blend(&a, &b, 0.5);
        assert_eq!(blended.num_events(), 5);
    }

    #[test]
    fn percentage_covered_handles_wraparound() {
        let track = even_track(4);
        let start = track.get_time(Percentage::new(0.9));
        let end = track.get_time(Percentage::new(0.1));
        let range = SyncTrackTimeRange { start, end };
        let covered = track.calculate_percentage_covered(range);
        assert!((covered - 0.2).abs() < 1e-3);
    }

    #[test]
    fn synchronized_duration_interpolates_per_event_rate() {
        let d = calculate_duration_synchronized(2.0, 4.0, 2, 4, 3, 0.5);
        // per-event: a=1.0, b=1.0 -> blended per-event 1.0 * 3 events = 3.0
        assert!((d - 3.0).abs() < 1e-4);
    }
}
