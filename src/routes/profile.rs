use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{normalize_email, AuthenticatedUser, CurrentUser},
    error::AppError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/users/:id", get(profile))
        .route("/friends", post(add_friend))
}

async fn me(current: CurrentUser) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    Ok(Redirect::to(&format!("/users/{}", user.id)))
}

#[derive(Clone)]
struct FriendRow {
    id: i64,
    fname: String,
    img_url: String,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    full_name: String,
    email: String,
    img_url: String,
    is_self: bool,
    friends: Vec<FriendRow>,
    show_message: bool,
    message: String,
}

async fn profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let viewer = current.require_user()?;
    render_profile(&state, viewer, user_id, None).await
}

async fn render_profile(
    state: &AppState,
    viewer: &AuthenticatedUser,
    user_id: i64,
    message: Option<String>,
) -> Result<Response, AppError> {
    let user = state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let friends = state
        .store
        .friends_of(user.id)
        .await?
        .into_iter()
        .map(|friend| FriendRow {
            id: friend.user_id,
            fname: friend.fname,
            img_url: friend.img_url.unwrap_or_default(),
        })
        .collect();

    Ok(AskamaTemplateResponse::into_response(ProfileTemplate {
        full_name: user.full_name(),
        email: user.email,
        img_url: user.img_url.unwrap_or_default(),
        is_self: user.id == viewer.id,
        friends,
        show_message: message.is_some(),
        message: message.unwrap_or_default(),
    }))
}

#[derive(Deserialize)]
struct FriendForm {
    email: String,
}

async fn add_friend(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<FriendForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let email = normalize_email(&form.email);

    let Some(friend) = state.store.user_by_email(&email).await? else {
        let page = render_profile(
            &state,
            user,
            user.id,
            Some("We couldn't find anyone with that email in our system.".into()),
        )
        .await?;
        return Ok((StatusCode::BAD_REQUEST, page).into_response());
    };

    match state.store.add_friendship(user.id, friend.id).await {
        Ok(_) => {
            info!(user_id = user.id, friend_id = friend.id, "friend added");
            Ok(Redirect::to(&format!("/users/{}", user.id)).into_response())
        }
        Err(AppError::BadRequest(msg)) => {
            let page = render_profile(&state, user, user.id, Some(msg)).await?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
        Err(err) => Err(err),
    }
}
