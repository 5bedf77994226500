pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod partition;
pub mod routes;
pub mod state;
pub mod store;
