pub mod day;
pub mod event;
pub mod friendship;
pub mod permission;
pub mod session;
pub mod trip;
pub mod user;
