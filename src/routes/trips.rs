use std::collections::HashMap;

use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};
use tracing::info;
use url::Url;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        day::Day,
        event::{Event, NewEvent},
        permission::Access,
        trip::{NewTrip, Trip},
    },
    partition::MAX_TRIP_DAYS,
    state::AppState,
    store::TripStore,
};

use super::{format_day_range, normalize_optional};

const FORM_DATE: &str = "%Y-%m-%d";
const FORM_TIME: &str = "%H:%M";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(trips_list))
        .route("/new", get(trip_new_form).post(trip_new_submit))
        .route("/:id", get(trip_detail))
        .route("/:id/itinerary.json", get(itinerary))
        .route("/:id/delete", post(trip_delete))
        .route("/:id/permissions", post(permission_grant))
        .route("/:id/permissions/:user_id/delete", post(permission_revoke))
        .route("/:id/days/:day_num/events", post(event_new_submit))
}

#[derive(Clone)]
struct TripSummary {
    id: i64,
    title: String,
    dates: String,
    city: String,
    is_owner: bool,
}

#[derive(Template)]
#[template(path = "trips/list.html")]
struct TripsListTemplate {
    trips: Vec<TripSummary>,
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state
        .store
        .trips_for_user(user.id)
        .await?
        .into_iter()
        .map(|trip| TripSummary {
            id: trip.id,
            dates: format_day_range(trip.start, trip.end),
            city: trip.city.unwrap_or_default(),
            is_owner: trip.admin_id == user.id,
            title: trip.title,
        })
        .collect();
    Ok(AskamaTemplateResponse::into_response(TripsListTemplate {
        trips,
    }))
}

#[derive(Template)]
#[template(path = "trips/new.html")]
struct TripNewTemplate {
    show_error: bool,
    error_message: String,
    form: TripFormValues,
}

#[derive(Clone, Default)]
struct TripFormValues {
    title: String,
    city: String,
    start: String,
    end: String,
    place_name: String,
    address: String,
    country_code: String,
}

async fn trip_new_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(TripNewTemplate {
        show_error: false,
        error_message: String::new(),
        form: TripFormValues::default(),
    }))
}

#[serde_as]
#[derive(Deserialize)]
struct TripForm {
    title: String,
    city: String,
    start: String,
    end: String,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    latitude: Option<f64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    longitude: Option<f64>,
}

impl TripForm {
    fn values(&self) -> TripFormValues {
        TripFormValues {
            title: self.title.clone(),
            city: self.city.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            place_name: self.place_name.clone().unwrap_or_default(),
            address: self.address.clone().unwrap_or_default(),
            country_code: self.country_code.clone().unwrap_or_default(),
        }
    }

    /// The start date begins at midnight and the end date runs until 23:59,
    /// so a range of N calendar days partitions into N days.
    fn into_new_trip(self, admin_id: i64) -> Result<NewTrip, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("Give your trip a title.".into()));
        }

        let start = parse_form_date(&self.start)?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::BadRequest("Invalid start date.".into()))?;
        let end = parse_form_date(&self.end)?
            .and_hms_opt(23, 59, 0)
            .ok_or_else(|| AppError::BadRequest("Invalid end date.".into()))?;
        if start > end {
            return Err(AppError::BadRequest(
                "Your trip has to end on or after the day it starts.".into(),
            ));
        }
        if (end.date() - start.date()).num_days() >= MAX_TRIP_DAYS {
            return Err(AppError::BadRequest(format!(
                "Trips can last at most {MAX_TRIP_DAYS} days."
            )));
        }

        let mut trip = NewTrip::new(admin_id, title, start, end);
        trip.city = normalize_optional(Some(self.city));
        trip.place_name = normalize_optional(self.place_name);
        trip.address = normalize_optional(self.address);
        trip.country_code = normalize_optional(self.country_code).map(|code| code.to_uppercase());
        trip.latitude = self.latitude;
        trip.longitude = self.longitude;
        Ok(trip)
    }
}

fn parse_form_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), FORM_DATE)
        .map_err(|_| AppError::BadRequest(format!("'{raw}' is not a date (YYYY-MM-DD).")))
}

async fn trip_new_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<TripForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let values = form.values();

    let new_trip = match form.into_new_trip(user.id) {
        Ok(trip) => trip,
        Err(AppError::BadRequest(msg)) => return Ok(render_trip_form_error(values, msg)),
        Err(err) => return Err(err),
    };

    match state.store.create_planned_trip(&new_trip).await {
        Ok(trip) => Ok(Redirect::to(&format!("/trips/{}", trip.id)).into_response()),
        Err(AppError::Partition(err)) => Ok(render_trip_form_error(values, err.to_string())),
        Err(err) => Err(err),
    }
}

fn render_trip_form_error(form: TripFormValues, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(TripNewTemplate {
            show_error: true,
            error_message: message,
            form,
        }),
    )
        .into_response()
}

#[derive(Clone)]
struct EventView {
    title: String,
    time_range: String,
    description: String,
    location: String,
    url: String,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        let location = [
            event.place_name.as_deref(),
            event.address.as_deref(),
            Some(event.city.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
        Self {
            title: event.title.clone(),
            time_range: format!(
                "{}–{}",
                event.start.format(FORM_TIME),
                event.end.format(FORM_TIME)
            ),
            description: event.description.clone(),
            location,
            url: event.url.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
struct DayView {
    day_num: i64,
    label: String,
    events: Vec<EventView>,
}

#[derive(Clone)]
struct ShareRow {
    user_id: i64,
    name: String,
    access: String,
}

#[derive(Clone)]
struct FriendOption {
    user_id: i64,
    fname: String,
}

#[derive(Template)]
#[template(path = "trips/detail.html")]
struct TripDetailTemplate {
    trip_id: i64,
    title: String,
    dates: String,
    location: String,
    is_owner: bool,
    can_edit: bool,
    days: Vec<DayView>,
    shares: Vec<ShareRow>,
    friends: Vec<FriendOption>,
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.store.authorize(trip_id, user.id, Access::View).await?;
    let is_owner = trip.admin_id == user.id;
    let can_edit = is_owner
        || state
            .store
            .permission_for(trip.id, user.id)
            .await?
            .is_some_and(|permission| permission.allows(Access::Edit));

    let days = state.store.days_for_trip(trip.id).await?;
    let mut events_by_day = group_events(state.store.events_for_trip(trip.id).await?);
    let days = days
        .into_iter()
        .map(|day| DayView {
            day_num: day.day_num,
            label: day.label(),
            events: events_by_day
                .remove(&day.id)
                .unwrap_or_default()
                .iter()
                .map(EventView::from)
                .collect(),
        })
        .collect();

    let shares = state
        .store
        .shared_permissions(trip.id)
        .await?
        .into_iter()
        .map(|share| ShareRow {
            user_id: share.user_id,
            name: format!("{} {}", share.fname, share.lname),
            access: if share.can_edit {
                Access::Edit.as_str().to_string()
            } else {
                Access::View.as_str().to_string()
            },
        })
        .collect();

    let friends = if is_owner {
        state
            .store
            .friends_of(user.id)
            .await?
            .into_iter()
            .map(|friend| FriendOption {
                user_id: friend.user_id,
                fname: friend.fname,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(AskamaTemplateResponse::into_response(TripDetailTemplate {
        trip_id: trip.id,
        dates: format_day_range(trip.start, trip.end),
        location: trip_location(&trip),
        title: trip.title,
        is_owner,
        can_edit,
        days,
        shares,
        friends,
    }))
}

fn group_events(events: Vec<Event>) -> HashMap<i64, Vec<Event>> {
    let mut grouped: HashMap<i64, Vec<Event>> = HashMap::new();
    for event in events {
        grouped.entry(event.day_id).or_default().push(event);
    }
    grouped
}

fn trip_location(trip: &Trip) -> String {
    [
        trip.place_name.as_deref(),
        trip.city.as_deref(),
        trip.country_code.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ")
}

#[derive(Serialize)]
pub struct Itinerary {
    pub trip: Trip,
    pub days: Vec<ItineraryDay>,
}

#[derive(Serialize)]
pub struct ItineraryDay {
    #[serde(flatten)]
    pub day: Day,
    pub events: Vec<Event>,
}

async fn itinerary(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Itinerary>, AppError> {
    let user = current.require_user()?;
    let trip = state.store.authorize(trip_id, user.id, Access::View).await?;
    let mut events_by_day = group_events(state.store.events_for_trip(trip.id).await?);
    let days = state
        .store
        .days_for_trip(trip.id)
        .await?
        .into_iter()
        .map(|day| ItineraryDay {
            events: events_by_day.remove(&day.id).unwrap_or_default(),
            day,
        })
        .collect();
    Ok(Json(Itinerary { trip, days }))
}

async fn trip_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.store.authorize_owner(trip_id, user.id).await?;
    state.store.delete_trip(trip_id).await?;
    Ok(Redirect::to("/trips"))
}

#[derive(Deserialize)]
struct PermissionForm {
    friend_id: i64,
    #[serde(default)]
    can_edit: Option<String>,
}

async fn permission_grant(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Form(form): Form<PermissionForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.store.authorize_owner(trip_id, user.id).await?;
    if form.friend_id == user.id {
        return Err(AppError::BadRequest("You already own this trip.".into()));
    }
    let is_friend = state
        .store
        .friends_of(user.id)
        .await?
        .iter()
        .any(|friend| friend.user_id == form.friend_id);
    if !is_friend {
        return Err(AppError::BadRequest(
            "You can only share trips with your friends.".into(),
        ));
    }

    let access = if form.can_edit.is_some() {
        Access::Edit
    } else {
        Access::View
    };
    state
        .store
        .grant_permission(trip_id, form.friend_id, access)
        .await?;
    Ok(Redirect::to(&format!("/trips/{trip_id}")))
}

async fn permission_revoke(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, user_id)): Path<(i64, i64)>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.store.authorize_owner(trip_id, user.id).await?;
    state.store.revoke_permission(trip_id, user_id).await?;
    Ok(Redirect::to(&format!("/trips/{trip_id}")))
}

#[serde_as]
#[derive(Deserialize)]
struct EventForm {
    title: String,
    #[serde(default)]
    description: Option<String>,
    start_time: String,
    end_time: String,
    city: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    latitude: Option<f64>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    longitude: Option<f64>,
}

async fn event_new_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_num)): Path<(i64, i64)>,
    Form(form): Form<EventForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = state.store.authorize(trip_id, user.id, Access::Edit).await?;
    let day = state.store.day_by_number(trip.id, day_num).await?;

    let title = form.title.trim();
    let city = form.city.trim();
    if title.is_empty() || city.is_empty() {
        return Err(AppError::BadRequest("Events need a title and a city.".into()));
    }
    let start = on_day(&day, &form.start_time)?;
    let end = on_day(&day, &form.end_time)?;
    if start > end {
        return Err(AppError::BadRequest(
            "An event can't end before it starts.".into(),
        ));
    }
    let url = event_link(normalize_optional(form.url))?;

    let event = state
        .store
        .create_event(&NewEvent {
            day_id: day.id,
            user_id: user.id,
            title: title.to_string(),
            description: normalize_optional(form.description),
            start,
            end,
            url,
            place_name: normalize_optional(form.place_name),
            latitude: form.latitude,
            longitude: form.longitude,
            address: normalize_optional(form.address),
            city: city.to_string(),
            country_code: normalize_optional(form.country_code).map(|code| code.to_uppercase()),
        })
        .await?;

    info!(trip_id, day_num, event_id = event.id, "event added");
    Ok(Redirect::to(&format!("/trips/{trip_id}")))
}

fn on_day(day: &Day, raw_time: &str) -> Result<NaiveDateTime, AppError> {
    let time = NaiveTime::parse_from_str(raw_time.trim(), FORM_TIME)
        .map_err(|_| AppError::BadRequest(format!("'{raw_time}' is not a time (HH:MM).")))?;
    Ok(day.start.date().and_time(time))
}

/// Event links are rendered as anchors, so only web links are kept.
fn event_link(raw: Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(url.into())),
        _ => Err(AppError::BadRequest(format!(
            "'{raw}' is not an http(s) link."
        ))),
    }
}
