use crate::{
    error::Result,
    schedule::Week,
    types::{Booking, Cabin, CabinId, NewBooking},
};
use async_trait::async_trait;
use uuid::Uuid;

/// Authoritative store of cabins and booking records.
#[async_trait]
pub trait BookingBackend: Clone + Send + Sync + 'static {
    async fn cabins(&self) -> Result<Vec<Cabin>>;
    /// Bookings of `cabin`. Backends may ignore `window` and return every booking of the
    /// cabin; callers filter for display.
    async fn bookings(&self, cabin: CabinId, window: Option<&Week>) -> Result<Vec<Booking>>;
    async fn create_booking(&self, booking: NewBooking) -> Result<Booking>;
    async fn delete_booking(&self, id: Uuid) -> Result<()>;
}
