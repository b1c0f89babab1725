//! Occupancy model of a single cabin for a seven day window.
//!
//! The grid is a cache over the booking records of the backend. It is rebuilt from the
//! records after every load and every confirmed mutation and never patched in place.

use crate::{
    backend::BookingBackend,
    error::{BookingError, Result},
    schedule::{build_grid, parse_date, ScheduleGrid, SlotStatus, Week, WeekView},
    slots::SlotSequence,
    types::{Booking, CabinId, NewBooking},
};
use chrono::NaiveDate;
use std::{
    collections::HashSet,
    ops::Range,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, error, info, warn};

const DURATION_TOLERANCE: f64 = 1e-9;

type SlotKey = (NaiveDate, usize);

#[derive(Debug)]
struct ScheduleView {
    week: Week,
    bookings: Vec<Booking>,
    grid: ScheduleGrid,
    /// Bumped on every confirmed booking or cancellation.
    revision: u64,
}

pub struct WeeklyScheduleModel<B: BookingBackend> {
    backend: B,
    cabin: CabinId,
    slots: SlotSequence,
    view: Mutex<ScheduleView>,
    in_flight: Mutex<HashSet<SlotKey>>,
}

impl<B: BookingBackend> WeeklyScheduleModel<B> {
    /// Creates an empty model. Call [`Self::load_bookings`] to fill the grid.
    pub fn new(backend: B, cabin: CabinId, slots: SlotSequence, anchor: NaiveDate) -> Self {
        Self {
            backend,
            cabin,
            slots,
            view: Mutex::new(ScheduleView {
                week: Week::starting(anchor),
                bookings: Vec::new(),
                grid: ScheduleGrid::default(),
                revision: 0,
            }),
            in_flight: Mutex::default(),
        }
    }

    pub fn cabin(&self) -> CabinId {
        self.cabin
    }

    pub fn slots(&self) -> &SlotSequence {
        &self.slots
    }

    pub fn week(&self) -> Week {
        self.view().week
    }

    pub fn grid(&self) -> ScheduleGrid {
        self.view().grid.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.view().bookings.clone()
    }

    pub fn week_view(&self) -> WeekView {
        let view = self.view();
        WeekView::new(self.cabin, &view.grid, &view.week, &self.slots)
    }

    /// Moves the window to `[date, date + 6]` and reloads. `date` is `YYYY-MM-DD`.
    pub async fn set_anchor_date(&self, date: &str) -> Result<ScheduleGrid> {
        let anchor = parse_date(date)?;
        self.set_anchor(anchor).await
    }

    pub async fn set_anchor(&self, anchor: NaiveDate) -> Result<ScheduleGrid> {
        self.view().week = Week::starting(anchor);
        debug!(cabin = self.cabin, %anchor, "Anchor date changed");
        self.load_bookings().await
    }

    /// Fetches the bookings of the cabin and rebuilds the grid. On failure the previous grid
    /// stays in place.
    pub async fn load_bookings(&self) -> Result<ScheduleGrid> {
        let (week, revision) = {
            let view = self.view();
            (view.week, view.revision)
        };
        let mut bookings = self
            .backend
            .bookings(self.cabin, Some(&week))
            .await
            .map_err(|err| {
                warn!(?err, cabin = self.cabin, "Failed to load bookings, keeping stale grid");
                err
            })?;
        bookings.retain(|booking| booking.cabin == self.cabin && week.contains(booking.date));

        let mut view = self.view();
        if view.week != week {
            debug!(cabin = self.cabin, "Window changed while loading, discarding result");
            return Ok(view.grid.clone());
        }
        if view.revision != revision {
            debug!(cabin = self.cabin, "Schedule changed while loading, discarding result");
            return Ok(view.grid.clone());
        }
        view.grid = build_grid(&bookings, self.cabin, &week, &self.slots);
        view.bookings = bookings;
        debug!(
            cabin = self.cabin,
            bookings = view.bookings.len(),
            occupied = view.grid.occupied_count(),
            "Schedule rebuilt"
        );
        Ok(view.grid.clone())
    }

    pub fn is_occupied(&self, day: NaiveDate, slot: usize) -> bool {
        self.view().grid.is_occupied(day, slot)
    }

    pub fn check_conflict(&self, day: NaiveDate, slot: usize) -> bool {
        self.is_occupied(day, slot)
    }

    pub fn slot_status(&self, day: NaiveDate, slot: usize) -> SlotStatus {
        self.view().grid.status(day, slot)
    }

    /// Books `duration_hours` starting at `start_slot` on `day`.
    ///
    /// Every slot of the range is checked, not only the first one. Ranges running past the
    /// last slot are rejected. The grid only changes once the backend confirmed the booking.
    pub async fn book_slot(
        &self,
        day: NaiveDate,
        start_slot: usize,
        duration_hours: f64,
        user: &str,
    ) -> Result<Booking> {
        let range = self.validate_request(day, start_slot, duration_hours)?;
        if user.trim().is_empty() {
            return Err(BookingError::validation("A booking needs a user"));
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, day, range.clone())?;
        let occupied = {
            let view = self.view();
            range.clone().find(|slot| view.grid.is_occupied(day, *slot))
        };
        if let Some(slot) = occupied {
            let label = self.slots.label(slot).unwrap_or_default();
            warn!(cabin = self.cabin, %day, slot = %label, "Slot already booked");
            return Err(BookingError::conflict(format!(
                "{label} on {day} is already booked"
            )));
        }

        let start_time = self
            .slots
            .start_of(start_slot)
            .ok_or_else(|| BookingError::validation(format!("Slot {start_slot} does not exist")))?;
        let request = NewBooking {
            user: user.to_string(),
            cabin: self.cabin,
            date: day,
            start_time,
            duration: duration_hours,
        };

        let booking = match self.backend.create_booking(request).await {
            Ok(booking) => booking,
            Err(BookingError::Conflict(message)) => {
                warn!(cabin = self.cabin, %day, %message, "Backend reported a conflict");
                return Err(BookingError::Conflict(message));
            }
            Err(err) => {
                error!(?err, cabin = self.cabin, %day, "Booking failed");
                return Err(BookingError::BookingFailed(Box::new(err)));
            }
        };

        {
            let mut view = self.view();
            if view.week.contains(booking.date) {
                view.bookings.push(booking.clone());
            }
            view.grid = build_grid(&view.bookings, self.cabin, &view.week, &self.slots);
            view.revision += 1;
        }
        info!(
            id = %booking.id,
            cabin = self.cabin,
            %day,
            start = %booking.start_time,
            duration = booking.duration,
            "Slot booked"
        );
        Ok(booking)
    }

    /// Cancels the booking that starts at `start_slot` on `day` with exactly `duration_hours`.
    pub async fn cancel_booking(
        &self,
        day: NaiveDate,
        start_slot: usize,
        duration_hours: f64,
    ) -> Result<()> {
        let range = self.validate_request(day, start_slot, duration_hours)?;
        let start_time = self.slots.start_of(start_slot);

        let target = self
            .view()
            .bookings
            .iter()
            .find(|booking| {
                booking.date == day
                    && Some(booking.start_time) == start_time
                    && (booking.duration - duration_hours).abs() < DURATION_TOLERANCE
            })
            .map(|booking| booking.id);
        let Some(id) = target else {
            return Err(BookingError::NotFound(format!(
                "No booking of {duration_hours}h at {} on {day}",
                self.slots.label(start_slot).unwrap_or_default()
            )));
        };

        let _guard = InFlightGuard::acquire(&self.in_flight, day, range)?;
        self.backend.delete_booking(id).await.map_err(|err| {
            warn!(?err, %id, cabin = self.cabin, "Cancellation failed, grid unchanged");
            err
        })?;

        {
            let mut view = self.view();
            view.bookings.retain(|booking| booking.id != id);
            view.grid = build_grid(&view.bookings, self.cabin, &view.week, &self.slots);
            view.revision += 1;
        }
        info!(%id, cabin = self.cabin, %day, "Booking cancelled");
        Ok(())
    }

    fn validate_request(
        &self,
        day: NaiveDate,
        start_slot: usize,
        duration_hours: f64,
    ) -> Result<Range<usize>> {
        let week = self.week();
        if !week.contains(day) {
            return Err(BookingError::validation(format!(
                "{day} is outside the visible week {} to {}",
                week.anchor(),
                week.last_day()
            )));
        }
        self.slots.booking_range(start_slot, duration_hours)
    }

    fn view(&self) -> MutexGuard<'_, ScheduleView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks slots as having a booking request in progress. Released on drop.
struct InFlightGuard<'a> {
    pending: &'a Mutex<HashSet<SlotKey>>,
    keys: Vec<SlotKey>,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        pending: &'a Mutex<HashSet<SlotKey>>,
        day: NaiveDate,
        slots: Range<usize>,
    ) -> Result<Self> {
        let mut set = pending.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<SlotKey> = slots.map(|slot| (day, slot)).collect();
        if keys.iter().any(|key| set.contains(key)) {
            return Err(BookingError::conflict(format!(
                "Another request for {day} is already in progress"
            )));
        }
        set.extend(keys.iter().copied());
        Ok(Self { pending, keys })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            set.remove(key);
        }
    }
}
