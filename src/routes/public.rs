use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    state::AppState,
};

/// Where a fresh session lands.
const HOME: &str = "/trips";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login_form).post(login_submit))
        .route("/signup", get(signup_form).post(signup_submit))
        .route("/logout", post(logout))
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    logged_in: bool,
    fname: String,
}

async fn landing(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    AskamaTemplateResponse::into_response(LandingTemplate {
        logged_in: user.is_some(),
        fname: user.map(|user| user.fname).unwrap_or_default(),
    })
}

/// Renders a form page again with a 400 status.
fn rejected<T: Template + AskamaTemplateResponse>(page: T) -> Response {
    (StatusCode::BAD_REQUEST, AskamaTemplateResponse::into_response(page)).into_response()
}

/// Opens a session for `user_id` and sends the browser home with its cookie.
async fn start_session(
    state: &AppState,
    jar: PrivateCookieJar,
    user_id: i64,
) -> Result<Response, AppError> {
    let session_id = auth::create_session(state, user_id).await?;
    Ok((auth::apply_session_cookie(jar, &session_id), Redirect::to(HOME)).into_response())
}

#[derive(Template, Default)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    show_error: bool,
    error_message: String,
    email: String,
}

impl LoginTemplate {
    fn failed(email: String, error_message: String) -> Self {
        Self {
            show_error: true,
            error_message,
            email,
        }
    }
}

async fn login_form(CurrentUser(user): CurrentUser) -> Response {
    if user.is_some() {
        return Redirect::to(HOME).into_response();
    }
    AskamaTemplateResponse::into_response(LoginTemplate::default())
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(LoginForm { email, password }): Form<LoginForm>,
) -> Result<Response, AppError> {
    let message = match auth::authenticate_user(&state, &email, &password).await {
        Ok(user) => return start_session(&state, jar, user.id).await,
        Err(AppError::Unauthorized) => {
            "Your information could not be found in the system. Try again or sign up!".to_string()
        }
        Err(AppError::BadRequest(msg)) => msg,
        Err(err) => return Err(err),
    };
    Ok(rejected(LoginTemplate::failed(email, message)))
}

#[derive(Template, Default)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    show_error: bool,
    error_message: String,
    fname: String,
    lname: String,
    email: String,
}

async fn signup_form(CurrentUser(user): CurrentUser) -> Response {
    if user.is_some() {
        return Redirect::to(HOME).into_response();
    }
    AskamaTemplateResponse::into_response(SignupTemplate::default())
}

#[derive(Deserialize)]
struct SignupForm {
    fname: String,
    lname: String,
    email: String,
    password: String,
}

impl SignupForm {
    /// The filled-in form minus the password.
    fn failed(self, error_message: String) -> SignupTemplate {
        SignupTemplate {
            show_error: true,
            error_message,
            fname: self.fname,
            lname: self.lname,
            email: self.email,
        }
    }
}

async fn signup_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let registered =
        auth::register_user(&state, &form.fname, &form.lname, &form.email, &form.password).await;
    match registered {
        Ok(user) => start_session(&state, jar, user.id).await,
        Err(AppError::BadRequest(msg)) => Ok(rejected(form.failed(msg))),
        Err(err) => Err(err),
    }
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    if let Some(session_id) = jar.get(auth::SESSION_COOKIE).map(|cookie| cookie.value().to_owned()) {
        auth::destroy_session(&state, &session_id).await?;
    }
    Ok((auth::clear_session_cookie(jar), Redirect::to("/")))
}
