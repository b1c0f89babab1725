use crate::error::{BookingError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CabinId = u32;

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cabin {
    pub id: CabinId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_vacant_time: Option<String>,
}

impl Cabin {
    pub fn new(id: CabinId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            next_vacant_time: None,
        }
    }
}

/// A reservation as stored by a booking backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user: String,
    pub cabin: CabinId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Length in hours.
    pub duration: f64,
}

/// Request body of `POST /bookings/book`. The backend assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub user: String,
    pub cabin: CabinId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration: f64,
}

impl NewBooking {
    pub fn into_booking(self, id: Uuid) -> Booking {
        Booking {
            id,
            user: self.user,
            cabin: self.cabin,
            date: self.date,
            start_time: self.start_time,
            duration: self.duration,
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        end_of(self.starts_at(), self.duration)
    }

    pub fn end_time(&self) -> NaiveTime {
        self.ends_at().time()
    }

    pub fn check_duration(&self) -> Result<()> {
        check_duration(self.duration)
    }
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        end_of(self.starts_at(), self.duration)
    }

    pub fn end_time(&self) -> NaiveTime {
        self.ends_at().time()
    }

    /// Half-open interval overlap in the same cabin. Bookings running past midnight
    /// overlap the early hours of the next day.
    pub fn overlaps(&self, other: &NewBooking) -> bool {
        self.cabin == other.cabin
            && self.starts_at() < other.ends_at()
            && other.starts_at() < self.ends_at()
    }

    pub fn check_duration(&self) -> Result<()> {
        check_duration(self.duration)
    }
}

/// A stored duration must be a positive number of hours no longer than a day.
pub fn check_duration(hours: f64) -> Result<()> {
    if hours.is_finite() && hours > 0.0 && hours * 60.0 <= MINUTES_PER_DAY {
        Ok(())
    } else {
        Err(BookingError::validation(format!(
            "Booking duration of {hours}h is out of range"
        )))
    }
}

/// Converts hours to whole minutes, clamped to `[0, 24h]`.
pub fn duration_from_hours(hours: f64) -> Duration {
    let minutes = if hours.is_finite() {
        (hours * 60.0).round().clamp(0.0, MINUTES_PER_DAY)
    } else {
        0.0
    };
    Duration::minutes(minutes as i64)
}

fn end_of(start: NaiveDateTime, hours: f64) -> NaiveDateTime {
    start
        .checked_add_signed(duration_from_hours(hours))
        .unwrap_or(start)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Uuid,
    pub username: String,
}
