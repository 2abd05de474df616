//! Sampled event buffer — the append-only, per-tick record of every clip
//! event touched during graph evaluation, with the flags nodes stamp on
//! events they don't want to act on (`§4.14`/`§6`).

use crate::clip::ClipEvent;

/// Per-event metadata stamped on as the event propagates up through parent
/// nodes, never mutating the event payload itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampledEventFlags {
    pub ignored: bool,
    pub from_inactive_branch: bool,
    pub state_event: bool,
}

/// A single sampled event: the clip-authored payload plus the blend weight
/// it was sampled at, the node path it came from, and its flags.
#[derive(Debug, Clone)]
pub struct SampledEvent {
    pub event: ClipEvent,
    pub weight: f32,
    pub source_node_path: String,
    pub flags: SampledEventFlags,
}

/// Half-open `[start, end)` range into a `SampledEventBuffer`, as returned
/// by nodes that append events during their update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledEventRange {
    pub start: usize,
    pub end: usize,
}

impl SampledEventRange {
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Append-only buffer of sampled events for one tick. Cleared and the
/// generation bumped at the start of each tick per `§4.14`; ranges from a
/// stale generation are never read.
#[derive(Debug, Default)]
pub struct SampledEventBuffer {
    events: Vec<SampledEvent>,
    generation: u64,
}

impl SampledEventBuffer {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear the buffer and advance the generation counter, invalidating
    /// any range captured against the previous generation.
    pub fn begin_tick(&mut self) {
        self.events.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn append(&mut self, event: ClipEvent, weight: f32, source_node_path: &str) -> SampledEventRange {
        let start = self.events.len();
        self.events.push(SampledEvent {
            event,
            weight,
            source_node_path: source_node_path.to_string(),
            flags: SampledEventFlags::default(),
        });
        SampledEventRange {
            start,
            end: self.events.len(),
        }
    }

    pub fn append_range(&mut self, events: impl IntoIterator<Item = ClipEvent>, weight: f32, source_node_path: &str) -> SampledEventRange {
        let start = self.events.len();
        for event in events {
            self.events.push(SampledEvent {
                event,
                weight,
                source_node_path: source_node_path.to_string(),
                flags: SampledEventFlags::default(),
            });
        }
        SampledEventRange {
            start,
            end: self.events.len(),
        }
    }

    pub fn events(&self, range: SampledEventRange) -> &[SampledEvent] {
        &self.events[range.start.min(self.events.len())..range.end.min(self.events.len())]
    }

    /// Mark every event in `range` as belonging to an inactive branch
    /// (used when a blend drops a source's weight to zero but still wants
    /// its events visible to observers).
    pub fn mark_inactive_branch(&mut self, range: SampledEventRange) {
        for e in self.events[range.start.min(self.events.len())..range.end.min(self.events.len())].iter_mut() {
            e.flags.from_inactive_branch = true;
        }
    }

    pub fn mark_ignored(&mut self, range: SampledEventRange) {
        for e in self.events[range.start.min(self.events.len())..range.end.min(self.events.len())].iter_mut() {
            e.flags.ignored = true;
        }
    }

    /// Marks every event in `range` as a state-machine lifecycle event
    /// (entry/exit) rather than a clip-authored one.
    pub fn mark_state_event(&mut self, range: SampledEventRange) {
        for e in self.events[range.start.min(self.events.len())..range.end.min(self.events.len())].iter_mut() {
            e.flags.state_event = true;
        }
    }

    /// Combine two adjacent (or not) ranges into their enclosing span. Used
    /// when a blend node reports events from both its source and target.
    pub fn combine(a: SampledEventRange, b: SampledEventRange) -> SampledEventRange {
        if a.is_empty() {
            return b;
        }
        if b.is_empty() {
            return a;
        }
        SampledEventRange {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipEvent;

    fn event(payload: &str, percentage: f32) -> ClipEvent {
        ClipEvent {
            start_percentage: percentage,
            end_percentage: percentage,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn append_returns_growing_range() {
        let mut buf = SampledEventBuffer::new();
        buf.begin_tick();
        let r1 = buf.append(event("a", 0.1), 1.0, "root");
        let r2 = buf.append(event("b", 0.2), 1.0, "root");
        assert_eq!(r1, SampledEventRange { start: 0, end: 1 });
        assert_eq!(r2, SampledEventRange { start: 1, end: 2 });
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn begin_tick_clears_and_bumps_generation() {
        let mut buf = SampledEventBuffer::new();
        buf.begin_tick();
        buf.append(event("a", 0.1), 1.0, "root");
        let gen_before = buf.generation();
        buf.begin_tick();
        assert!(buf.is_empty());
        assert_eq!(buf.generation(), gen_before + 1);
    }

    #[test]
    fn combine_spans_two_ranges() {
        let a = SampledEventRange { start: 2, end: 4 };
        let b = SampledEventRange { start: 6, end: 8 };
        let combined = SampledEventBuffer::combine(a, b);
        assert_eq!(combined, SampledEventRange { start: 2, end: 8 });
    }

    #[test]
    fn combine_with_empty_returns_other() {
        let a = SampledEventRange::EMPTY;
        let b = SampledEventRange { start: 3, end: 5 };
        assert_eq!(SampledEventBuffer::combine(a, b), b);
        assert_eq!(SampledEventBuffer::combine(b, a), b);
    }

    #[test]
    fn mark_ignored_sets_flag_on_range_only() {
        let mut buf = SampledEventBuffer::new();
        buf.begin_tick();
        let r1 = buf.append(event("a", 0.1), 1.0, "root");
        let r2 = buf.append(event("b", 0.2), 1.0, "root");
        buf.mark_ignored(r1);
        assert!(buf.events(r1)[0].flags.ignored);
        assert!(!buf.events(r2)[0].flags.ignored);
    }
}
