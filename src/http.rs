use crate::auth::{AccountStore, LoginRequest, SignupRequest};
use crate::backend::BookingBackend;
use crate::configuration::Configuration;
use crate::error::{BookingError, Result};
use crate::schedule::{build_grid, parse_date, ScheduleGrid, Week, WeekView};
use crate::slots::SlotSequence;
use crate::types::{Booking, Cabin, CabinId, NewBooking, Session};
use crate::weekly_schedule::WeeklyScheduleModel;
use axum::extract::{Path, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState<T: BookingBackend> {
    pub backend: T,
    pub accounts: AccountStore,
    pub slots: SlotSequence,
}

impl<T: BookingBackend> AppState<T> {
    pub fn new(backend: T, slots: SlotSequence) -> Self {
        Self {
            backend,
            accounts: AccountStore::default(),
            slots,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeekQuery {
    anchor: Option<String>,
}

pub fn create_app<T: BookingBackend, C: Configuration>(
    backend: T,
    configuration: &C,
) -> Result<Router> {
    let slots = configuration.slot_sequence()?;
    Ok(create_router(AppState::new(backend, slots)))
}

pub fn create_router<T: BookingBackend>(state: AppState<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/cabins", get(get_cabins::<T>))
        .route("/bookings/cabin/:cabin_id", get(get_cabin_bookings::<T>))
        .route("/bookings/cabin/:cabin_id/week", get(get_cabin_week::<T>))
        .route("/auth/signup", post(signup::<T>))
        .route("/auth/login", post(login::<T>));

    let protected = Router::new()
        .route("/bookings/book", post(book_cabin::<T>))
        .route("/auth/logout", post(logout::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session::<T>,
        ));

    Router::new()
        .nest("/api", public.merge(protected))
        .with_state(state)
        .layer(cors)
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = match &self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            BookingError::SourceUnavailable(_) | BookingError::BookingFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        (status, self.to_string()).into_response()
    }
}

async fn require_session<T: BookingBackend>(
    State(state): State<AppState<T>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, BookingError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| BookingError::Unauthorized("Missing credentials".into()))?;
    let token = Uuid::parse_str(token.trim())
        .map_err(|_| BookingError::Unauthorized("Malformed session token".into()))?;

    let username = state.accounts.authenticate(token)?;
    request
        .extensions_mut()
        .insert(Session { token, username });
    Ok(next.run(request).await)
}

async fn get_cabins<T: BookingBackend>(
    State(state): State<AppState<T>>,
) -> std::result::Result<Json<Vec<Cabin>>, BookingError> {
    let now = Local::now().naive_local();
    let week = Week::starting(now.date());

    let mut cabins = state.backend.cabins().await?;
    for cabin in &mut cabins {
        let bookings = state.backend.bookings(cabin.id, Some(&week)).await?;
        let grid = build_grid(&bookings, cabin.id, &week, &state.slots);
        cabin.next_vacant_time = Some(next_vacant_label(&grid, &week, &state.slots, now));
    }
    Ok(Json(cabins))
}

async fn get_cabin_bookings<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(cabin_id): Path<CabinId>,
) -> std::result::Result<Json<Vec<Booking>>, BookingError> {
    ensure_cabin(&state, cabin_id).await?;
    Ok(Json(state.backend.bookings(cabin_id, None).await?))
}

async fn get_cabin_week<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(cabin_id): Path<CabinId>,
    Query(query): Query<WeekQuery>,
) -> std::result::Result<Json<WeekView>, BookingError> {
    ensure_cabin(&state, cabin_id).await?;
    let anchor = match query.anchor.as_deref() {
        Some(anchor) => parse_date(anchor)?,
        None => Local::now().date_naive(),
    };

    let model =
        WeeklyScheduleModel::new(state.backend.clone(), cabin_id, state.slots.clone(), anchor);
    model.load_bookings().await?;
    Ok(Json(model.week_view()))
}

async fn book_cabin<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(session): Extension<Session>,
    Json(booking): Json<NewBooking>,
) -> std::result::Result<Json<Booking>, BookingError> {
    if booking.user != session.username {
        warn!(session = %session.username, requested = %booking.user, "Booking for another user");
        return Err(BookingError::Unauthorized(
            "Bookings can only be made for the logged in user".into(),
        ));
    }
    let start_slot = state.slots.index_of(booking.start_time).ok_or_else(|| {
        BookingError::validation(format!(
            "{} is not the start of a bookable slot",
            booking.start_time
        ))
    })?;
    state.slots.booking_range(start_slot, booking.duration)?;
    if booking.date.and_time(booking.start_time) < Local::now().naive_local() {
        return Err(BookingError::validation("Timeslot already passed"));
    }

    let booking = state.backend.create_booking(booking).await?;
    info!(id = %booking.id, user = %booking.user, cabin = booking.cabin, "Cabin booked");
    Ok(Json(booking))
}

async fn signup<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Json(request): Json<SignupRequest>,
) -> std::result::Result<impl IntoResponse, BookingError> {
    state.accounts.signup(request)?;
    Ok((StatusCode::OK, "Signup successful".to_string()))
}

async fn login<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Json(request): Json<LoginRequest>,
) -> std::result::Result<Json<Session>, BookingError> {
    Ok(Json(state.accounts.login(&request)?))
}

async fn logout<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Extension(session): Extension<Session>,
) -> std::result::Result<impl IntoResponse, BookingError> {
    state.accounts.logout(session.token)?;
    info!(username = %session.username, "Logged out");
    Ok((StatusCode::OK, "Logout successful".to_string()))
}

async fn ensure_cabin<T: BookingBackend>(state: &AppState<T>, cabin_id: CabinId) -> Result<()> {
    let cabins = state.backend.cabins().await?;
    if cabins.iter().any(|cabin| cabin.id == cabin_id) {
        Ok(())
    } else {
        Err(BookingError::NotFound(format!(
            "Cabin {cabin_id} does not exist"
        )))
    }
}

fn next_vacant_label(
    grid: &ScheduleGrid,
    week: &Week,
    slots: &SlotSequence,
    now: NaiveDateTime,
) -> String {
    match grid.next_vacant(week, slots, now) {
        Some((day, slot)) => {
            let label = slots.label(slot).unwrap_or_default();
            if day == now.date() {
                label
            } else {
                format!("{} {label}", day.format("%a %b %-d"))
            }
        }
        None => "Fully booked".into(),
    }
}
