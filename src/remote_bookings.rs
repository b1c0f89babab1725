use crate::{
    auth::{LoginRequest, SignupRequest},
    backend::BookingBackend,
    error::{BookingError, Result},
    schedule::Week,
    types::{Booking, Cabin, CabinId, NewBooking, Session},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Client for the booking REST service. The service has no cancellation endpoint, so
/// `delete_booking` is unsupported.
#[derive(Debug, Clone)]
pub struct RemoteBookings {
    client: Client,
    base_url: String,
    token: Arc<Mutex<Option<Uuid>>>,
}

impl Default for RemoteBookings {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl RemoteBookings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::default(),
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()
            .await?;
        let session: Session = check_status(response).await?.json().await?;

        if let Ok(mut token) = self.token.lock() {
            *token = Some(session.token);
        }
        debug!(username = %session.username, "Logged in");
        Ok(session)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/signup"))
            .json(request)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Ends the session on the service and forgets the token. Without a session this is a no-op.
    pub async fn logout(&self) -> Result<()> {
        let token = self.token.lock().ok().and_then(|mut token| token.take());
        let Some(token) = token else {
            return Ok(());
        };
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response).await?;
        debug!("Logged out");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.lock().ok().and_then(|token| *token) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BookingBackend for RemoteBookings {
    async fn cabins(&self) -> Result<Vec<Cabin>> {
        let response = self.client.get(self.url("/cabins")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn bookings(&self, cabin: CabinId, _window: Option<&Week>) -> Result<Vec<Booking>> {
        let response = self
            .client
            .get(self.url(&format!("/bookings/cabin/{cabin}")))
            .send()
            .await?;
        let bookings: Vec<Booking> = check_status(response).await?.json().await?;
        if let Some(err) = bookings.iter().find_map(|b| b.check_duration().err()) {
            warn!(cabin, "Booking service returned an invalid record");
            return Err(BookingError::unavailable(format!(
                "Invalid booking record from service: {err}"
            )));
        }
        Ok(bookings)
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking> {
        let request = self.client.post(self.url("/bookings/book")).json(&booking);
        let response = self.authorize(request).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn delete_booking(&self, id: Uuid) -> Result<()> {
        warn!(%id, "Booking service has no cancellation endpoint");
        Err(BookingError::Unsupported(
            "The booking service does not support cancellation".into(),
        ))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    warn!(%status, %message, "Booking service rejected request");
    Err(match status {
        StatusCode::BAD_REQUEST => BookingError::Validation(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BookingError::Unauthorized(message),
        StatusCode::NOT_FOUND => BookingError::NotFound(message),
        StatusCode::CONFLICT => BookingError::Conflict(message),
        _ => BookingError::SourceUnavailable(format!("{status}: {message}")),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use httpmock::prelude::*;
    use serde_json::json;

    fn new_booking() -> NewBooking {
        NewBooking {
            user: "Stefan1".into(),
            cabin: 2,
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration: 1.0,
        }
    }

    #[tokio::test]
    async fn test_list_cabins_and_bookings() {
        let server = MockServer::start_async().await;
        let booking_id = Uuid::new_v4();

        let cabins_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/cabins");
                then.status(200).json_body(json!([
                    { "id": 1, "name": "Cabin 1", "nextVacantTime": "10:30 AM" },
                    { "id": 2, "name": "Cabin 2", "nextVacantTime": "11:00 AM" }
                ]));
            })
            .await;
        let bookings_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/bookings/cabin/2");
                then.status(200).json_body(json!([{
                    "id": booking_id,
                    "user": "Stefan1",
                    "cabin": 2,
                    "date": "2024-06-03",
                    "startTime": "09:00:00",
                    "duration": 1.0
                }]));
            })
            .await;

        let remote = RemoteBookings::new(server.url("/api"));
        let cabins = remote.cabins().await.unwrap();
        assert_eq!(cabins.len(), 2);
        assert_eq!(cabins[0].next_vacant_time.as_deref(), Some("10:30 AM"));

        let bookings = remote.bookings(2, None).await.unwrap();
        assert_eq!(bookings, vec![new_booking().into_booking(booking_id)]);

        cabins_mock.assert_async().await;
        bookings_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_then_book_sends_token() {
        let server = MockServer::start_async().await;
        let token = Uuid::new_v4();
        let booking_id = Uuid::new_v4();

        let login_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/login")
                    .json_body(json!({ "username": "Stefan1", "password": "Secret123" }));
                then.status(200)
                    .json_body(json!({ "token": token, "username": "Stefan1" }));
            })
            .await;
        let book_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/bookings/book")
                    .header("authorization", format!("Bearer {token}"))
                    .json_body(json!({
                        "user": "Stefan1",
                        "cabin": 2,
                        "date": "2024-06-03",
                        "startTime": "09:00:00",
                        "duration": 1.0
                    }));
                then.status(200).json_body(json!({
                    "id": booking_id,
                    "user": "Stefan1",
                    "cabin": 2,
                    "date": "2024-06-03",
                    "startTime": "09:00:00",
                    "duration": 1.0
                }));
            })
            .await;

        let remote = RemoteBookings::new(server.url("/api"));
        let session = remote
            .login(&LoginRequest {
                username: "Stefan1".into(),
                password: "Secret123".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.token, token);

        let booking = remote.create_booking(new_booking()).await.unwrap();
        assert_eq!(booking.id, booking_id);

        login_mock.assert_async().await;
        book_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_record_from_service() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/bookings/cabin/2");
                then.status(200).json_body(json!([{
                    "id": Uuid::new_v4(),
                    "user": "Stefan1",
                    "cabin": 2,
                    "date": "2024-06-03",
                    "startTime": "10:00:00",
                    "duration": 1e300
                }]));
            })
            .await;

        let remote = RemoteBookings::new(server.url("/api"));
        assert!(matches!(
            remote.bookings(2, None).await,
            Err(BookingError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let server = MockServer::start_async().await;
        let token = Uuid::new_v4();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/login");
                then.status(200)
                    .json_body(json!({ "token": token, "username": "Stefan1" }));
            })
            .await;
        let logout_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/logout")
                    .header("authorization", format!("Bearer {token}"));
                then.status(200).body("Logout successful");
            })
            .await;
        let authorized_book_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/bookings/book")
                    .header("authorization", format!("Bearer {token}"));
                then.status(200);
            })
            .await;

        let remote = RemoteBookings::new(server.url("/api"));
        remote
            .login(&LoginRequest {
                username: "Stefan1".into(),
                password: "Secret123".into(),
            })
            .await
            .unwrap();
        remote.logout().await.unwrap();
        // a second logout has no session to end
        remote.logout().await.unwrap();

        // unmatched requests are answered with 404
        assert!(matches!(
            remote.create_booking(new_booking()).await,
            Err(BookingError::NotFound(_))
        ));
        logout_mock.assert_async().await;
        assert_eq!(authorized_book_mock.hits_async().await, 0);
    }

    #[test_case::test_case(400, "Validation" ; "bad request")]
    #[test_case::test_case(401, "Unauthorized" ; "unauthorized")]
    #[test_case::test_case(404, "NotFound" ; "not found")]
    #[test_case::test_case(409, "Conflict" ; "conflict")]
    #[test_case::test_case(500, "SourceUnavailable" ; "server error")]
    #[tokio::test]
    async fn test_status_mapping(status: u16, expected: &str) {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/bookings/book");
                then.status(status).body("rejected");
            })
            .await;

        let remote = RemoteBookings::new(server.url("/api"));
        let err = remote.create_booking(new_booking()).await.unwrap_err();
        let kind = match err {
            BookingError::Validation(_) => "Validation",
            BookingError::Unauthorized(_) => "Unauthorized",
            BookingError::NotFound(_) => "NotFound",
            BookingError::Conflict(_) => "Conflict",
            BookingError::SourceUnavailable(_) => "SourceUnavailable",
            _ => "other",
        };
        assert_eq!(kind, expected);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // nothing listens on the discard port
        let remote = RemoteBookings::new("http://127.0.0.1:9/api");
        assert!(matches!(
            remote.bookings(1, None).await,
            Err(BookingError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_unsupported() {
        let remote = RemoteBookings::default();
        assert!(matches!(
            remote.delete_booking(Uuid::new_v4()).await,
            Err(BookingError::Unsupported(_))
        ));
    }
}
