use crate::{
    backend::BookingBackend,
    error::{BookingError, Result},
    schedule::Week,
    types::{Booking, Cabin, CabinId, NewBooking},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{error, info};
use uuid::Uuid;

const NUMBER_OF_CABINS: CabinId = 6;

#[derive(Debug, Default)]
struct Store {
    cabins: Vec<Cabin>,
    bookings: HashMap<Uuid, Booking>,
}

/// On-disk format. Only booking records are persisted, never a derived grid.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBookings {
    cabins: Vec<Cabin>,
    bookings: Vec<Booking>,
}

#[derive(Debug, Clone)]
pub struct LocalBookings {
    store: Arc<Mutex<Store>>,
    path: Option<PathBuf>,
}

impl Default for LocalBookings {
    fn default() -> Self {
        Self::with_cabins(default_cabins())
    }
}

impl LocalBookings {
    pub fn with_cabins(cabins: Vec<Cabin>) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                cabins,
                bookings: HashMap::new(),
            })),
            path: None,
        }
    }

    /// Opens a JSON backed store, creating it with the default cabins if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|err| {
                BookingError::unavailable(format!("Failed to read {}: {err}", path.display()))
            })?;
            let stored: StoredBookings = serde_json::from_str(&content).map_err(|err| {
                BookingError::unavailable(format!("Failed to parse {}: {err}", path.display()))
            })?;
            if let Some(err) = stored.bookings.iter().find_map(|b| b.check_duration().err()) {
                error!(path = %path.display(), "{err}");
                return Err(BookingError::unavailable(format!(
                    "Invalid booking record in {}: {err}",
                    path.display()
                )));
            }
            info!(
                path = %path.display(),
                bookings = stored.bookings.len(),
                "Loaded persisted bookings"
            );
            Store {
                cabins: stored.cabins,
                bookings: stored
                    .bookings
                    .into_iter()
                    .map(|booking| (booking.id, booking))
                    .collect(),
            }
        } else {
            Store {
                cabins: default_cabins(),
                bookings: HashMap::new(),
            }
        };

        let local_bookings = Self {
            store: Arc::new(Mutex::new(store)),
            path: Some(path),
        };
        {
            let store = local_bookings.lock()?;
            local_bookings.persist(&store)?;
        }
        Ok(local_bookings)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| BookingError::unavailable("Booking store lock poisoned"))
    }

    fn persist(&self, store: &Store) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut bookings: Vec<Booking> = store.bookings.values().cloned().collect();
        sort_bookings(&mut bookings);
        let stored = StoredBookings {
            cabins: store.cabins.clone(),
            bookings,
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|err| BookingError::unavailable(err.to_string()))?;

        fs::write(path, content).map_err(|err| {
            error!(?err, path = %path.display(), "Failed to persist bookings");
            BookingError::unavailable(format!("Failed to write {}: {err}", path.display()))
        })
    }
}

#[async_trait]
impl BookingBackend for LocalBookings {
    async fn cabins(&self) -> Result<Vec<Cabin>> {
        Ok(self.lock()?.cabins.clone())
    }

    async fn bookings(&self, cabin: CabinId, window: Option<&Week>) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .lock()?
            .bookings
            .values()
            .filter(|booking| booking.cabin == cabin)
            .filter(|booking| window.map_or(true, |week| week.contains(booking.date)))
            .cloned()
            .collect();
        sort_bookings(&mut bookings);
        Ok(bookings)
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking> {
        booking.check_duration()?;
        let mut store = self.lock()?;

        if !store.cabins.iter().any(|cabin| cabin.id == booking.cabin) {
            return Err(BookingError::NotFound(format!(
                "Cabin {} does not exist",
                booking.cabin
            )));
        }
        if let Some(existing) = store
            .bookings
            .values()
            .find(|existing| existing.overlaps(&booking))
        {
            let err = format!(
                "Cabin {} is already booked on {} from {} to {}",
                existing.cabin,
                existing.date,
                existing.start_time.format("%H:%M"),
                existing.end_time().format("%H:%M")
            );
            error!("{err}");
            return Err(BookingError::Conflict(err));
        }

        let booking = booking.into_booking(Uuid::new_v4());
        store.bookings.insert(booking.id, booking.clone());
        if let Err(err) = self.persist(&store) {
            store.bookings.remove(&booking.id);
            return Err(err);
        }

        info!(id = %booking.id, cabin = booking.cabin, date = %booking.date, "Booking created");
        Ok(booking)
    }

    async fn delete_booking(&self, id: Uuid) -> Result<()> {
        let mut store = self.lock()?;

        let Some(removed) = store.bookings.remove(&id) else {
            let err = "Booking does not exist and can't therefore not be removed";
            error!(%id, "{err}");
            return Err(BookingError::NotFound(err.into()));
        };
        if let Err(err) = self.persist(&store) {
            store.bookings.insert(id, removed);
            return Err(err);
        }

        info!(%id, "Booking removed");
        Ok(())
    }
}

fn default_cabins() -> Vec<Cabin> {
    (1..=NUMBER_OF_CABINS)
        .map(|id| Cabin::new(id, format!("Cabin {id}")))
        .collect()
}

fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_unstable_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
}
