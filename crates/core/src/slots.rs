use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` span of time, used for busy blocks, free slots and query windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Option<Self> {
        Self::new(start, start + length)
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Tiles `[window_start, window_end)` with `duration`-long slots that avoid every busy interval.
///
/// The cursor jumps to the end of each busy interval it meets, so a gap shorter than
/// `duration` yields nothing and slots never straddle a busy block.
pub fn free_intervals(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    busy: &[Interval],
    duration: Duration,
) -> Vec<Interval> {
    let mut slots = Vec::new();
    if duration <= Duration::zero() || window_end <= window_start {
        return slots;
    }

    let mut sorted = busy.to_vec();
    sorted.sort_by_key(|interval| interval.start);

    let mut cursor = window_start;
    for block in &sorted {
        if block.end <= cursor {
            continue;
        }
        let gap_end = block.start.min(window_end);
        while cursor + duration <= gap_end {
            slots.push(Interval { start: cursor, end: cursor + duration });
            cursor += duration;
        }
        cursor = cursor.max(block.end);
        if cursor >= window_end {
            return slots;
        }
    }

    while cursor + duration <= window_end {
        slots.push(Interval { start: cursor, end: cursor + duration });
        cursor += duration;
    }
    slots
}

pub fn is_available(start: DateTime<Utc>, end: DateTime<Utc>, busy: &[Interval]) -> bool {
    let candidate = Interval { start, end };
    !busy.iter().any(|block| candidate.overlaps(block))
}
