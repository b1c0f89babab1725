use crate::{
    error::{BookingError, Result},
    slots::SlotSequence,
    types::{Booking, CabinId},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

pub const DAYS_PER_WEEK: usize = 7;

pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|err| BookingError::validation(format!("Invalid date '{date}': {err}")))
}

/// Seven consecutive days starting at the anchor date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    anchor: NaiveDate,
}

impl Week {
    pub fn starting(anchor: NaiveDate) -> Self {
        Self { anchor }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn last_day(&self) -> NaiveDate {
        self.anchor + Duration::days(DAYS_PER_WEEK as i64 - 1)
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        self.anchor
            .iter_days()
            .take(DAYS_PER_WEEK)
            .collect()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.anchor && day <= self.last_day()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Occupied,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "Available"),
            SlotStatus::Occupied => write!(f, "Occupied"),
        }
    }
}

/// Occupied slot indices per day. Days without any occupied slot have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleGrid {
    occupied: BTreeMap<NaiveDate, BTreeSet<usize>>,
}

impl ScheduleGrid {
    pub fn is_occupied(&self, day: NaiveDate, slot: usize) -> bool {
        self.occupied
            .get(&day)
            .is_some_and(|slots| slots.contains(&slot))
    }

    pub fn status(&self, day: NaiveDate, slot: usize) -> SlotStatus {
        if self.is_occupied(day, slot) {
            SlotStatus::Occupied
        } else {
            SlotStatus::Available
        }
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.values().map(BTreeSet::len).sum()
    }

    /// First free slot at or after `now` within `week`.
    pub fn next_vacant(
        &self,
        week: &Week,
        slots: &SlotSequence,
        now: NaiveDateTime,
    ) -> Option<(NaiveDate, usize)> {
        week.days()
            .into_iter()
            .filter(|day| *day >= now.date())
            .flat_map(|day| (0..slots.len()).map(move |slot| (day, slot)))
            .find(|(day, slot)| {
                let starts_later = *day > now.date()
                    || slots
                        .start_of(*slot)
                        .is_some_and(|start| start >= now.time());
                starts_later && !self.is_occupied(*day, *slot)
            })
    }

    fn mark(&mut self, day: NaiveDate, slot: usize) {
        self.occupied.entry(day).or_default().insert(slot);
    }
}

/// Rebuilds the occupancy of `cabin` for `week` from the authoritative booking records.
/// Bookings of other cabins or outside the week are ignored. Slots past the end of the
/// sequence are dropped.
pub fn build_grid(
    bookings: &[Booking],
    cabin: CabinId,
    week: &Week,
    slots: &SlotSequence,
) -> ScheduleGrid {
    let mut grid = ScheduleGrid::default();
    for booking in bookings
        .iter()
        .filter(|booking| booking.cabin == cabin && week.contains(booking.date))
    {
        for slot in slots.covered_by(booking.start_time, booking.duration) {
            grid.mark(booking.date, slot);
        }
    }
    grid
}

/// Serializable rendering of a grid, one row per day of the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekView {
    pub cabin: CabinId,
    pub days: Vec<NaiveDate>,
    pub slots: Vec<String>,
    pub occupied: BTreeMap<NaiveDate, Vec<bool>>,
}

impl WeekView {
    pub fn new(cabin: CabinId, grid: &ScheduleGrid, week: &Week, slots: &SlotSequence) -> Self {
        let days = week.days();
        let occupied = days
            .iter()
            .map(|day| {
                let row = (0..slots.len())
                    .map(|slot| grid.is_occupied(*day, slot))
                    .collect();
                (*day, row)
            })
            .collect();
        Self {
            cabin,
            days,
            slots: slots.labels(),
            occupied,
        }
    }
}
