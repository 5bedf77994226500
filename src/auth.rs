use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::user::{NewUser, User},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "wayfarer_session";

const MIN_PASSWORD_LEN: usize = 8;

/// The logged-in user of the current request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub fname: String,
    pub email: String,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fname: user.fname,
            email: user.email,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key.clone());
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };

        let user = state
            .store
            .session_user(cookie.value())
            .await?
            .map(AuthenticatedUser::from);
        if let Some(user) = &user {
            parts.extensions.insert(user.clone());
        }
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register_user(
    state: &AppState,
    fname: &str,
    lname: &str,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let fname = fname.trim();
    let lname = lname.trim();
    let email = normalize_email(email);

    if fname.is_empty() || lname.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest(
            "First name, last name and email are required.".into(),
        ));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("That doesn't look like an email address.".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Passwords need at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    if state.store.user_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest(
            "We found your email in our database. Try logging in instead!".into(),
        ));
    }

    let user = state
        .store
        .create_user(&NewUser {
            fname: fname.to_string(),
            lname: lname.to_string(),
            email,
            password_hash: hash_password(password)?,
        })
        .await?;

    info!(user_id = user.id, "user registered");
    Ok(user.into())
}

pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let email = normalize_email(email);
    let Some(user) = state.store.user_by_email(&email).await? else {
        debug!("login attempt for unknown email");
        return Err(AppError::Unauthorized);
    };

    if !verify_password(password, &user.password_hash)? {
        debug!(user_id = user.id, "login attempt with wrong password");
        return Err(AppError::Unauthorized);
    }

    Ok(user.into())
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| AppError::Password(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Password(err.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|err| AppError::Password(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let session = state
        .store
        .create_session(user_id, state.config.session_ttl)
        .await?;
    Ok(session.id)
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    state.store.delete_session(session_id).await
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}
