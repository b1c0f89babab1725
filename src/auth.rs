use crate::{
    error::{BookingError, Result},
    types::Session,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref CAPITAL_LETTER: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref DIGIT: Regex = Regex::new(r"[0-9]").unwrap();
}

const USERNAME_RULE: &str = "Username must include at least 1 capital letter and 1 number.";
const PASSWORD_RULE: &str =
    "Password must be at least 8 characters long, include 1 capital letter, and 1 number.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
    #[validate(email(message = "Email address is invalid"))]
    pub email: String,
}

impl SignupRequest {
    pub fn check(&self) -> Result<()> {
        self.check_username()?;
        self.check_credentials()
    }

    fn check_username(&self) -> Result<()> {
        if !(CAPITAL_LETTER.is_match(&self.username) && DIGIT.is_match(&self.username)) {
            return Err(BookingError::validation(USERNAME_RULE));
        }
        Ok(())
    }

    /// Password rule, then the field validators.
    fn check_credentials(&self) -> Result<()> {
        if self.password.chars().count() < 8
            || !CAPITAL_LETTER.is_match(&self.password)
            || !DIGIT.is_match(&self.password)
        {
            return Err(BookingError::validation(PASSWORD_RULE));
        }
        self.validate()?;
        Ok(())
    }
}

#[derive(Debug)]
struct Account {
    email: String,
    salt: Uuid,
    password_hash: String,
}

/// Registered users and their session tokens.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    sessions: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl AccountStore {
    pub fn signup(&self, request: SignupRequest) -> Result<()> {
        request.check_username()?;

        let mut accounts = lock(&self.accounts)?;
        if accounts.contains_key(&request.username) {
            warn!(username = %request.username, "Signup with existing username");
            return Err(BookingError::conflict(
                "Username already exists. Please choose another.",
            ));
        }
        request.check_credentials()?;

        let salt = Uuid::new_v4();
        let account = Account {
            email: request.email,
            salt,
            password_hash: hash_password(salt, &request.password),
        };
        info!(username = %request.username, email = %account.email, "Account created");
        accounts.insert(request.username, account);
        Ok(())
    }

    pub fn login(&self, request: &LoginRequest) -> Result<Session> {
        let accounts = lock(&self.accounts)?;
        let valid = accounts.get(&request.username).is_some_and(|account| {
            account.password_hash == hash_password(account.salt, &request.password)
        });
        if !valid {
            warn!(username = %request.username, "Login failed");
            return Err(BookingError::Unauthorized(
                "Invalid username or password".into(),
            ));
        }
        drop(accounts);

        let token = Uuid::new_v4();
        lock(&self.sessions)?.insert(token, request.username.clone());
        info!(username = %request.username, "Login successful");
        Ok(Session {
            token,
            username: request.username.clone(),
        })
    }

    /// Username owning `token`.
    pub fn authenticate(&self, token: Uuid) -> Result<String> {
        lock(&self.sessions)?
            .get(&token)
            .cloned()
            .ok_or_else(|| BookingError::Unauthorized("Unknown session".into()))
    }

    pub fn logout(&self, token: Uuid) -> Result<()> {
        lock(&self.sessions)?
            .remove(&token)
            .map(|_| ())
            .ok_or_else(|| BookingError::Unauthorized("Unknown session".into()))
    }
}

fn hash_password(salt: Uuid, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| BookingError::unavailable("Account store lock poisoned"))
}
