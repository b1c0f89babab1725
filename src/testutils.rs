use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    backend::BookingBackend,
    error::{BookingError, Result},
    schedule::Week,
    types::{Booking, Cabin, CabinId, NewBooking},
};

pub struct MockBookingBackendInner {
    pub success: AtomicBool,
    pub supports_delete: AtomicBool,
    pub delay_ms: AtomicU64,
    pub load_delay_ms: AtomicU64,
    pub calls_to_cabins: AtomicU64,
    pub calls_to_bookings: AtomicU64,
    pub calls_to_create_booking: AtomicU64,
    pub calls_to_delete_booking: AtomicU64,
    pub bookings: Mutex<Vec<Booking>>,
}

#[derive(Clone)]
pub struct MockBookingBackend(pub Arc<MockBookingBackendInner>);

impl MockBookingBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            supports_delete: AtomicBool::new(true),
            delay_ms: AtomicU64::default(),
            load_delay_ms: AtomicU64::default(),
            calls_to_cabins: AtomicU64::default(),
            calls_to_bookings: AtomicU64::default(),
            calls_to_create_booking: AtomicU64::default(),
            calls_to_delete_booking: AtomicU64::default(),
            bookings: Mutex::default(),
        }
    }
}

impl MockBookingBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockBookingBackendInner::new()))
    }

    pub fn set_success(&self, success: bool) {
        self.0.success.store(success, Ordering::SeqCst);
    }

    pub fn calls(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    fn result(&self) -> Result<()> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(BookingError::unavailable("Supposed to fail")),
        }
    }

    async fn delay(&self) {
        sleep_for(&self.0.delay_ms).await;
    }
}

#[async_trait]
impl BookingBackend for MockBookingBackend {
    async fn cabins(&self) -> Result<Vec<Cabin>> {
        self.0.calls_to_cabins.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(vec![Cabin::new(1, "Cabin 1"), Cabin::new(2, "Cabin 2")])
    }

    async fn bookings(&self, cabin: CabinId, _window: Option<&Week>) -> Result<Vec<Booking>> {
        self.0.calls_to_bookings.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let bookings = self
            .0
            .bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|booking| booking.cabin == cabin)
            .cloned()
            .collect();
        // answers with the snapshot taken before the delay
        sleep_for(&self.0.load_delay_ms).await;
        Ok(bookings)
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking> {
        self.0.calls_to_create_booking.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.result()?;
        let booking = booking.into_booking(Uuid::new_v4());
        self.0.bookings.lock().unwrap().push(booking.clone());
        Ok(booking)
    }

    async fn delete_booking(&self, id: Uuid) -> Result<()> {
        self.0.calls_to_delete_booking.fetch_add(1, Ordering::SeqCst);
        if !self.0.supports_delete.load(Ordering::SeqCst) {
            return Err(BookingError::Unsupported("No cancellation endpoint".into()));
        }
        self.result()?;
        self.0.bookings.lock().unwrap().retain(|booking| booking.id != id);
        Ok(())
    }
}

async fn sleep_for(delay_ms: &AtomicU64) {
    let delay = delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
