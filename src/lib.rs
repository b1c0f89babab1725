pub mod auth;
pub mod backend;
pub mod configuration;
pub mod configuration_handler;
pub mod error;
pub mod http;
pub mod local_bookings;
pub mod remote_bookings;
pub mod schedule;
pub mod slots;
#[cfg(test)]
mod testutils;
pub mod types;
pub mod weekly_schedule;

pub use backend::BookingBackend;
pub use error::{BookingError, Result};
pub use local_bookings::LocalBookings;
pub use remote_bookings::RemoteBookings;
pub use schedule::{build_grid, ScheduleGrid, SlotStatus, Week, WeekView};
pub use slots::SlotSequence;
pub use types::{Booking, Cabin, CabinId, NewBooking};
pub use weekly_schedule::WeeklyScheduleModel;
