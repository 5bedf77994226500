use std::{collections::HashMap, fmt, net::SocketAddr};

use anyhow::Context;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, NaiveDateTime};
use cucumber::{given, then, when, World as _};
use tempfile::TempDir;
use tower::ServiceExt;
use wayfarer::{
    auth::{self, AuthenticatedUser},
    config::AppConfig,
    db::{init_pool, migrate},
    error::AppError,
    models::{event::Event, event::NewEvent, permission::Access, trip::NewTrip, trip::Trip},
    partition::{partition_trip, PartitionError},
    routes::create_router,
    state::AppState,
    store::TripStore,
};

const STEP_TIME: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: HashMap<String, AuthenticatedUser>,
    trip: Option<Trip>,
    last_error: Option<AppError>,
    last_status: Option<StatusCode>,
    last_location: Option<String>,
    last_body: Option<Vec<u8>>,
    session_cookie: Option<String>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn user(&self, fname: &str) -> &AuthenticatedUser {
        self.users
            .get(fname)
            .unwrap_or_else(|| panic!("user {fname} must be registered first"))
    }

    fn trip(&self) -> &Trip {
        self.trip.as_ref().expect("a trip must exist first")
    }

    /// Fills `{trip}` with the current trip id and `{Name}` with that user's id.
    fn expand(&self, raw: &str) -> String {
        let mut expanded = raw.to_string();
        if let Some(trip) = &self.trip {
            expanded = expanded.replace("{trip}", &trip.id.to_string());
        }
        for (fname, user) in &self.users {
            expanded = expanded.replace(&format!("{{{fname}}}"), &user.id.to_string());
        }
        expanded
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            static_root: root.path().join("static"),
            cookie_secret: "bdd-cookie-secret".into(),
            session_ttl: Duration::hours(1),
        };

        let db = init_pool(&config.database_url).await?;
        migrate(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, STEP_TIME).expect("timestamp in step")
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.trip = None;
    world.last_error = None;
}

// Accounts

#[given(
    regex = r#"^a registered user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn given_registered_user(world: &mut AppWorld, fname: String, email: String, password: String) {
    let created = auth::register_user(world.app_state(), &fname, "Traveller", &email, &password)
        .await
        .expect("register user");
    world.users.insert(fname, created);
}

#[when(regex = r#"^I register \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#)]
async fn when_register(world: &mut AppWorld, fname: String, email: String, password: String) {
    world.last_error =
        auth::register_user(world.app_state(), &fname, "Traveller", &email, &password)
            .await
            .err();
}

#[then(regex = r#"^I can authenticate as \"([^\"]+)\" using password \"([^\"]+)\"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, email: String, password: String) {
    let authed = auth::authenticate_user(world.app_state(), &email, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.email, email.to_lowercase());
}

#[then(regex = r#"^authenticating as \"([^\"]+)\" with password \"([^\"]+)\" fails$"#)]
async fn then_cannot_authenticate(world: &mut AppWorld, email: String, password: String) {
    let result = auth::authenticate_user(world.app_state(), &email, &password).await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

#[then(regex = r#"^the stored password for \"([^\"]+)\" is not \"([^\"]+)\"$"#)]
async fn then_password_not_plaintext(world: &mut AppWorld, email: String, password: String) {
    let user = world
        .app_state()
        .store
        .user_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    assert_ne!(user.password_hash, password);
    assert!(user.password_hash.starts_with("$argon2"));
}

#[then("the last action was refused")]
async fn then_refused(world: &mut AppWorld) {
    let error = world.last_error.take().expect("an error was expected");
    assert!(
        matches!(
            error,
            AppError::BadRequest(_) | AppError::Forbidden | AppError::Partition(_)
        ),
        "unexpected error: {error:?}"
    );
}

// Trips and days

#[when(regex = r#"^\"([^\"]+)\" creates a trip from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_create_trip(world: &mut AppWorld, fname: String, start: String, end: String) {
    let owner = world.user(&fname).id;
    let store = &world.app_state().store;
    let trip_id = store
        .create_trip(&NewTrip::new(owner, "Summer", at(&start), at(&end)))
        .await
        .expect("create trip");
    let trip = store.get_trip(trip_id).await.expect("load trip");
    world.trip = Some(trip);
}

#[when(regex = r#"^\"([^\"]+)\" tries to create a trip from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_try_create_trip(world: &mut AppWorld, fname: String, start: String, end: String) {
    let owner = world.user(&fname).id;
    world.last_error = world
        .app_state()
        .store
        .create_trip(&NewTrip::new(owner, "Backwards", at(&start), at(&end)))
        .await
        .err();
}

#[given(regex = r#"^\"([^\"]+)\" plans a trip from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn given_planned_trip(world: &mut AppWorld, fname: String, start: String, end: String) {
    let owner = world.user(&fname).id;
    let mut new_trip = NewTrip::new(owner, "City break", at(&start), at(&end));
    new_trip.city = Some("Paris".into());
    let trip = world
        .app_state()
        .store
        .create_planned_trip(&new_trip)
        .await
        .expect("plan trip");
    world.trip = Some(trip);
}

#[when(regex = r#"^\"([^\"]+)\" tries to plan a trip from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_try_plan_trip(world: &mut AppWorld, fname: String, start: String, end: String) {
    let owner = world.user(&fname).id;
    world.last_error = world
        .app_state()
        .store
        .create_planned_trip(&NewTrip::new(owner, "Grand tour", at(&start), at(&end)))
        .await
        .err();
}

#[when("the trip's days are generated")]
async fn when_generate_days(world: &mut AppWorld) {
    let trip = world.trip().clone();
    partition_trip(&world.app_state().store, &trip)
        .await
        .expect("generate days");
}

#[when("generating the trip's days fails")]
async fn when_generate_days_fails(world: &mut AppWorld) {
    let trip = world.trip().clone();
    let result = partition_trip(&world.app_state().store, &trip).await;
    assert!(matches!(result, Err(AppError::Database(_))), "got {result:?}");
}

#[when("generating the trip's days is refused")]
async fn when_generate_days_refused(world: &mut AppWorld) {
    let trip = world.trip().clone();
    let result = partition_trip(&world.app_state().store, &trip).await;
    assert!(
        matches!(result, Err(AppError::Partition(PartitionError::TooLong { .. }))),
        "got {result:?}"
    );
}

#[given(regex = r"^day inserts fail from day (\d+) on$")]
async fn given_day_inserts_fail(world: &mut AppWorld, day_num: i64) {
    let sql = format!(
        "CREATE TRIGGER fail_day_inserts BEFORE INSERT ON days WHEN NEW.day_num >= {day_num} \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END"
    );
    sqlx::query(&sql)
        .execute(world.app_state().store.pool())
        .await
        .expect("install failing trigger");
}

#[then(regex = r"^the trip has (\d+) days?$")]
async fn then_trip_has_days(world: &mut AppWorld, expected: usize) {
    let days = world
        .app_state()
        .store
        .days_for_trip(world.trip().id)
        .await
        .expect("load days");
    assert_eq!(days.len(), expected);
}

#[then(regex = r#"^day (\d+) runs from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn then_day_runs(world: &mut AppWorld, day_num: i64, start: String, end: String) {
    let days = world
        .app_state()
        .store
        .days_for_trip(world.trip().id)
        .await
        .expect("load days");
    let day = days
        .iter()
        .find(|day| day.day_num == day_num)
        .unwrap_or_else(|| panic!("day {day_num} should exist"));
    assert_eq!(day.start, at(&start));
    assert_eq!(day.end, at(&end));
}

#[then(regex = r"^day number (\d+) appears (\d+) times$")]
async fn then_day_number_repeats(world: &mut AppWorld, day_num: i64, expected: usize) {
    let days = world
        .app_state()
        .store
        .days_for_trip(world.trip().id)
        .await
        .expect("load days");
    let count = days.iter().filter(|day| day.day_num == day_num).count();
    assert_eq!(count, expected);
}

#[then("the trip is rejected as invalid")]
async fn then_trip_rejected(world: &mut AppWorld) {
    let error = world.last_error.take().expect("an error was expected");
    assert!(
        matches!(
            error,
            AppError::Partition(PartitionError::StartAfterEnd { .. })
        ),
        "unexpected error: {error:?}"
    );
}

#[then(regex = r#"^\"([^\"]+)\" has (\d+) trips?$"#)]
async fn then_user_has_trips(world: &mut AppWorld, fname: String, expected: usize) {
    let user_id = world.user(&fname).id;
    let trips = world
        .app_state()
        .store
        .trips_for_user(user_id)
        .await
        .expect("list trips");
    assert_eq!(trips.len(), expected);
}

#[when("the owner deletes the trip")]
async fn when_delete_trip(world: &mut AppWorld) {
    world
        .app_state()
        .store
        .delete_trip(world.trip().id)
        .await
        .expect("delete trip");
}

#[then("the trip no longer exists")]
async fn then_trip_gone(world: &mut AppWorld) {
    let result = world.app_state().store.get_trip(world.trip().id).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

// Events

#[when(
    regex = r#"^\"([^\"]+)\" adds an event \"([^\"]+)\" on day (\d+) from \"([^\"]+)\" to \"([^\"]+)\"$"#
)]
async fn when_add_event(
    world: &mut AppWorld,
    fname: String,
    title: String,
    day_num: i64,
    start: String,
    end: String,
) {
    let user_id = world.user(&fname).id;
    let store = &world.app_state().store;
    let day = store
        .day_by_number(world.trip().id, day_num)
        .await
        .expect("day exists");
    store
        .create_event(&NewEvent {
            day_id: day.id,
            user_id,
            title,
            description: None,
            start: at(&start),
            end: at(&end),
            url: None,
            place_name: None,
            latitude: None,
            longitude: None,
            address: None,
            city: "Paris".into(),
            country_code: Some("FR".into()),
        })
        .await
        .expect("create event");
}

#[then(regex = r#"^the event \"([^\"]+)\" runs from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn then_event_runs(world: &mut AppWorld, title: String, start: String, end: String) {
    let event = find_event(world, &title).await;
    assert_eq!(event.start, at(&start));
    assert_eq!(event.end, at(&end));
}

#[then(regex = r#"^the event \"([^\"]+)\" is at (-?[\d.]+), (-?[\d.]+)$"#)]
async fn then_event_at(world: &mut AppWorld, title: String, latitude: f64, longitude: f64) {
    let event = find_event(world, &title).await;
    assert_eq!(event.latitude, Some(latitude));
    assert_eq!(event.longitude, Some(longitude));
}

#[then(regex = r#"^the event \"([^\"]+)\" links to \"([^\"]+)\"$"#)]
async fn then_event_links(world: &mut AppWorld, title: String, url: String) {
    let event = find_event(world, &title).await;
    assert_eq!(event.url.as_deref(), Some(url.as_str()));
}

async fn find_event(world: &AppWorld, title: &str) -> Event {
    world
        .app_state()
        .store
        .events_for_trip(world.trip().id)
        .await
        .expect("load events")
        .into_iter()
        .find(|event| event.title == title)
        .unwrap_or_else(|| panic!("event {title} should exist"))
}

#[then(regex = r"^the trip has (\d+) events?$")]
async fn then_trip_has_events(world: &mut AppWorld, expected: usize) {
    let events = world
        .app_state()
        .store
        .events_for_trip(world.trip().id)
        .await
        .expect("load events");
    assert_eq!(events.len(), expected);
    assert!(events
        .iter()
        .all(|event| event.description == "No description available."));
}

// Sharing

#[when(regex = r#"^\"([^\"]+)\" shares the trip with \"([^\"]+)\" for (viewing|editing)$"#)]
async fn when_share(world: &mut AppWorld, owner: String, friend: String, mode: String) {
    let owner_id = world.user(&owner).id;
    let friend_id = world.user(&friend).id;
    let trip_id = world.trip().id;
    let access = if mode == "editing" {
        Access::Edit
    } else {
        Access::View
    };
    let store = &world.app_state().store;
    store
        .authorize_owner(trip_id, owner_id)
        .await
        .expect("owner may share");
    store
        .grant_permission(trip_id, friend_id, access)
        .await
        .expect("grant permission");
}

#[when(regex = r#"^\"([^\"]+)\" revokes \"([^\"]+)\"'s access$"#)]
async fn when_revoke(world: &mut AppWorld, _owner: String, friend: String) {
    let friend_id = world.user(&friend).id;
    world.last_error = world
        .app_state()
        .store
        .revoke_permission(world.trip().id, friend_id)
        .await
        .err();
}

#[then(regex = r#"^\"([^\"]+)\" (can|cannot) (view|edit) the trip$"#)]
async fn then_access(world: &mut AppWorld, fname: String, verdict: String, mode: String) {
    let user_id = world.user(&fname).id;
    let access = if mode == "edit" {
        Access::Edit
    } else {
        Access::View
    };
    let result = world
        .app_state()
        .store
        .authorize(world.trip().id, user_id, access)
        .await;
    if verdict == "can" {
        assert!(result.is_ok(), "expected access, got {result:?}");
    } else {
        assert!(matches!(result, Err(AppError::Forbidden)), "got {result:?}");
    }
}

#[then(regex = r"^the trip is shared with (\d+) (?:people|person)$")]
async fn then_shared_with(world: &mut AppWorld, expected: usize) {
    let shared = world
        .app_state()
        .store
        .shared_permissions(world.trip().id)
        .await
        .expect("list shares");
    assert_eq!(shared.len(), expected);
}

// Friends

#[when(regex = r#"^\"([^\"]+)\" befriends \"([^\"]+)\"$"#)]
async fn when_befriend(world: &mut AppWorld, fname: String, friend: String) {
    let user_id = world.user(&fname).id;
    let friend_id = world.user(&friend).id;
    world.last_error = world
        .app_state()
        .store
        .add_friendship(user_id, friend_id)
        .await
        .err();
}

#[then(regex = r#"^\"([^\"]+)\" has (\d+) friends?$"#)]
async fn then_user_has_friends(world: &mut AppWorld, fname: String, expected: usize) {
    let user_id = world.user(&fname).id;
    let friends = world
        .app_state()
        .store
        .friends_of(user_id)
        .await
        .expect("list friends");
    assert_eq!(friends.len(), expected);
}

// HTTP

async fn send(world: &mut AppWorld, request: Request<Body>) {
    let app = create_router(world.app_state().clone());
    let response = app.oneshot(request).await.expect("router is infallible");

    world.last_status = Some(response.status());
    world.last_location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Some(cookie) = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(auth::SESSION_COOKIE))
    {
        let pair = cookie.split(';').next().unwrap_or_default().to_string();
        world.session_cookie = Some(pair);
    }
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    world.last_body = Some(body.to_vec());
}

fn with_session(world: &AppWorld, builder: axum::http::request::Builder) -> axum::http::request::Builder {
    match &world.session_cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

#[when(regex = r#"^I request \"([^\"]+)\"$"#)]
async fn when_request(world: &mut AppWorld, path: String) {
    let request = with_session(world, Request::builder().uri(world.expand(&path)))
        .body(Body::empty())
        .expect("request");
    send(world, request).await;
}

#[when(
    regex = r#"^I sign up over HTTP as \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn when_http_signup(world: &mut AppWorld, fname: String, email: String, password: String) {
    let body = format!(
        "fname={fname}&lname=Traveller&email={}&password={password}",
        email.replace('@', "%40")
    );
    let request = Request::builder()
        .method("POST")
        .uri("/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request");
    send(world, request).await;
}

#[when(regex = r#"^I log in over HTTP as \"([^\"]+)\" with password \"([^\"]+)\"$"#)]
async fn when_http_login(world: &mut AppWorld, email: String, password: String) {
    let body = format!("email={}&password={password}", email.replace('@', "%40"));
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request");
    send(world, request).await;
}

#[when(regex = r#"^I post \"([^\"]+)\" with \"([^\"]*)\"$"#)]
async fn when_http_post(world: &mut AppWorld, path: String, body: String) {
    let uri = world.expand(&path);
    let body = world.expand(&body);
    let request = with_session(world, Request::builder().method("POST").uri(uri))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request");
    send(world, request).await;
}

#[when(regex = r#"^I submit a trip \"([^\"]+)\" from \"([^\"]+)\" to \"([^\"]+)\" over HTTP$"#)]
async fn when_http_trip(world: &mut AppWorld, title: String, start: String, end: String) {
    let body = format!(
        "title={}&city=Lisbon&start={start}&end={end}&place_name=&latitude=&longitude=",
        title.replace(' ', "+")
    );
    let request = with_session(world, Request::builder().method("POST").uri("/trips/new"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request");
    send(world, request).await;
}

#[then(regex = r"^the response status is (\d+)$")]
async fn then_status(world: &mut AppWorld, expected: u16) {
    let status = world.last_status.expect("a request was sent");
    assert_eq!(status.as_u16(), expected);
}

#[then(regex = r#"^the response redirects to \"([^\"]+)\"$"#)]
async fn then_redirects(world: &mut AppWorld, expected: String) {
    let expected = world.expand(&expected);
    assert_eq!(world.last_location.as_deref(), Some(expected.as_str()));
}

#[then("a session cookie is set")]
async fn then_session_cookie(world: &mut AppWorld) {
    assert!(world.session_cookie.is_some());
}

#[then(regex = r#"^the itinerary lists (\d+) days? starting on \"([^\"]+)\"$"#)]
async fn then_itinerary_days(world: &mut AppWorld, expected: usize, first_date: String) {
    let body = world.last_body.as_deref().expect("a response body");
    let itinerary: serde_json::Value = serde_json::from_slice(body).expect("itinerary is json");
    let days = itinerary["days"].as_array().expect("days array");

    assert_eq!(days.len(), expected);
    for (index, day) in days.iter().enumerate() {
        assert_eq!(day["day_num"].as_i64(), Some(index as i64 + 1));
        assert!(day["events"].is_array());
    }
    let first_start = days[0]["start"].as_str().expect("start timestamp");
    assert_eq!(first_start, format!("{first_date}T00:00:00"));
    assert_eq!(
        days[0]["end"].as_str(),
        Some(format!("{first_date}T23:59:00").as_str())
    );
}

#[then(regex = r#"^the newest trip of \"([^\"]+)\" has (\d+) days?$"#)]
async fn then_newest_trip_days(world: &mut AppWorld, email: String, expected: usize) {
    let store = &world.app_state().store;
    let user = store
        .user_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    let trips = store.trips_for_user(user.id).await.expect("list trips");
    let newest = trips
        .iter()
        .max_by_key(|trip| trip.id)
        .expect("at least one trip");
    let days = store.days_for_trip(newest.id).await.expect("load days");
    assert_eq!(days.len(), expected);
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run_and_exit("tests/features")
        .await;
}
