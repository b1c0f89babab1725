use crate::error::{BookingError, Result};
use chrono::{NaiveTime, Timelike};
use std::ops::Range;

const MINUTES_PER_DAY: i64 = 24 * 60;
const EPSILON: f64 = 1e-9;

/// The ordered, contiguous half-hour marks (or whatever granularity is configured) of a
/// business day. Slots are addressed by index.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSequence {
    first: NaiveTime,
    granularity_minutes: u32,
    count: usize,
    max_duration_hours: f64,
}

impl Default for SlotSequence {
    fn default() -> Self {
        Self {
            first: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            granularity_minutes: 30,
            count: 16,
            max_duration_hours: 1.5,
        }
    }
}

impl SlotSequence {
    pub fn new(
        first: NaiveTime,
        granularity_minutes: u32,
        count: usize,
        max_duration_hours: f64,
    ) -> Result<Self> {
        if granularity_minutes == 0 || count == 0 {
            return Err(BookingError::validation(
                "Slot granularity and slot count must be positive",
            ));
        }
        let last_end = minutes_of(first) + i64::from(granularity_minutes) * count as i64;
        if last_end > MINUTES_PER_DAY {
            return Err(BookingError::validation(
                "Slot sequence must end before midnight",
            ));
        }
        if !max_duration_hours.is_finite() || max_duration_hours <= 0.0 {
            return Err(BookingError::validation(
                "Maximum booking duration must be positive",
            ));
        }
        Ok(Self {
            first,
            granularity_minutes,
            count,
            max_duration_hours,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn granularity_minutes(&self) -> u32 {
        self.granularity_minutes
    }

    pub fn granularity_hours(&self) -> f64 {
        f64::from(self.granularity_minutes) / 60.0
    }

    pub fn max_duration_hours(&self) -> f64 {
        self.max_duration_hours
    }

    pub fn start_of(&self, index: usize) -> Option<NaiveTime> {
        if index >= self.count {
            return None;
        }
        let minutes = minutes_of(self.first) + self.step(index);
        NaiveTime::from_num_seconds_from_midnight_opt((minutes * 60) as u32, 0)
    }

    /// Human readable label, e.g. `9:00 AM`.
    pub fn label(&self, index: usize) -> Option<String> {
        self.start_of(index)
            .map(|time| time.format("%-I:%M %p").to_string())
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.count).filter_map(|index| self.label(index)).collect()
    }

    /// Index of the slot starting exactly at `time`.
    pub fn index_of(&self, time: NaiveTime) -> Option<usize> {
        let offset = minutes_of(time) - minutes_of(self.first);
        if time.second() != 0 || offset < 0 || offset % i64::from(self.granularity_minutes) != 0 {
            return None;
        }
        let index = (offset / i64::from(self.granularity_minutes)) as usize;
        (index < self.count).then_some(index)
    }

    /// Number of slots a booking of `duration_hours` occupies.
    pub fn slots_needed(&self, duration_hours: f64) -> Result<usize> {
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(BookingError::validation(format!(
                "Duration must be positive, got {duration_hours}h"
            )));
        }
        if duration_hours > self.max_duration_hours + EPSILON {
            return Err(BookingError::validation(format!(
                "Duration {duration_hours}h exceeds the maximum of {}h",
                self.max_duration_hours
            )));
        }
        let units = duration_hours / self.granularity_hours();
        let rounded = units.round();
        if (units - rounded).abs() > EPSILON {
            return Err(BookingError::validation(format!(
                "Duration {duration_hours}h is not a multiple of {} minutes",
                self.granularity_minutes
            )));
        }
        Ok(rounded as usize)
    }

    /// Slot range reserved by a booking. Ranges running past the last slot are rejected
    /// rather than truncated.
    pub fn booking_range(&self, start_slot: usize, duration_hours: f64) -> Result<Range<usize>> {
        if start_slot >= self.count {
            return Err(BookingError::validation(format!(
                "Slot {start_slot} does not exist, there are {} slots",
                self.count
            )));
        }
        let end = start_slot + self.slots_needed(duration_hours)?;
        if end > self.count {
            return Err(BookingError::validation(format!(
                "Booking of {duration_hours}h starting at {} runs past the last slot",
                self.label(start_slot).unwrap_or_default()
            )));
        }
        Ok(start_slot..end)
    }

    /// Indices of all slots intersecting `[start, start + duration)`, clipped to the sequence.
    /// Durations that are not a positive finite number cover nothing.
    pub fn covered_by(&self, start: NaiveTime, duration_hours: f64) -> Range<usize> {
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return 0..0;
        }
        let granularity = i64::from(self.granularity_minutes);
        let begin = minutes_of(start) - minutes_of(self.first);
        let span = (duration_hours * 60.0).round().min(MINUTES_PER_DAY as f64) as i64;
        let end = begin.saturating_add(span);
        if end <= 0 || end <= begin {
            return 0..0;
        }
        let first_slot = begin.max(0) / granularity;
        // ceil for the exclusive upper bound
        let last_slot = (end + granularity - 1) / granularity;
        let first_slot = (first_slot as usize).min(self.count);
        let last_slot = (last_slot as usize).min(self.count);
        first_slot..last_slot
    }

    fn step(&self, index: usize) -> i64 {
        i64::from(self.granularity_minutes) * index as i64
    }
}

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight() / 60)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_default_sequence_labels() {
        let slots = SlotSequence::default();
        let labels = slots.labels();
        assert_eq!(labels.len(), 16);
        assert_eq!(labels[0], "9:00 AM");
        assert_eq!(labels[6], "12:00 PM");
        assert_eq!(labels[8], "1:00 PM");
        assert_eq!(labels[15], "4:30 PM");
        assert_eq!(slots.label(16), None);
    }

    #[test_case(time(9, 0), Some(0))]
    #[test_case(time(10, 30), Some(3))]
    #[test_case(time(16, 30), Some(15))]
    #[test_case(time(17, 0), None ; "after last slot")]
    #[test_case(time(8, 30), None ; "before first slot")]
    #[test_case(time(9, 15), None ; "not aligned")]
    fn test_index_of(input: NaiveTime, expected: Option<usize>) {
        assert_eq!(SlotSequence::default().index_of(input), expected);
    }

    #[test_case(0.5, 1)]
    #[test_case(1.0, 2)]
    #[test_case(1.5, 3)]
    fn test_slots_needed(duration: f64, expected: usize) {
        assert_eq!(SlotSequence::default().slots_needed(duration).unwrap(), expected);
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-0.5 ; "negative")]
    #[test_case(0.75 ; "not a multiple")]
    #[test_case(2.0 ; "above maximum")]
    #[test_case(f64::NAN ; "nan")]
    fn test_invalid_durations(duration: f64) {
        assert!(matches!(
            SlotSequence::default().slots_needed(duration),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn test_booking_range_rejects_overrun() {
        let slots = SlotSequence::default();
        assert_eq!(slots.booking_range(0, 1.0).unwrap(), 0..2);
        assert_eq!(slots.booking_range(14, 1.0).unwrap(), 14..16);
        assert!(matches!(
            slots.booking_range(15, 1.0),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            slots.booking_range(16, 0.5),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn test_covered_by_clips_to_sequence() {
        let slots = SlotSequence::default();
        assert_eq!(slots.covered_by(time(9, 0), 1.0), 0..2);
        assert_eq!(slots.covered_by(time(16, 30), 1.0), 15..16);
        assert_eq!(slots.covered_by(time(8, 30), 1.0), 0..1);
        assert_eq!(slots.covered_by(time(9, 15), 0.5), 0..2);
        assert_eq!(slots.covered_by(time(7, 0), 1.0), 0..0);
        assert_eq!(slots.covered_by(time(17, 0), 1.0), 16..16);
    }

    #[test_case(1e300, 2..16 ; "huge")]
    #[test_case(f64::INFINITY, 0..0 ; "infinite")]
    #[test_case(f64::NAN, 0..0 ; "nan")]
    #[test_case(-1.0, 0..0 ; "negative")]
    #[test_case(0.0, 0..0 ; "zero")]
    fn test_covered_by_out_of_range_duration(duration: f64, expected: Range<usize>) {
        let slots = SlotSequence::default();
        assert_eq!(slots.covered_by(time(10, 0), duration), expected);
    }

    #[test]
    fn test_custom_sequence() {
        let slots = SlotSequence::new(time(8, 0), 60, 4, 2.0).unwrap();
        assert_eq!(slots.labels(), vec!["8:00 AM", "9:00 AM", "10:00 AM", "11:00 AM"]);
        assert_eq!(slots.slots_needed(2.0).unwrap(), 2);
        assert!(SlotSequence::new(time(8, 0), 0, 4, 2.0).is_err());
        assert!(SlotSequence::new(time(23, 0), 60, 2, 2.0).is_err());
    }
}
