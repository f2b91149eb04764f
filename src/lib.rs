mod auth;
mod config;
mod database;
mod error;
mod models;
mod web;

pub use config::Config;
pub use database::Database;
pub use error::ApiError;
pub use web::{AppState, routes};
