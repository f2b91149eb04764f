//! Configuration Management
//!
//! Configuration values are read from environment variables with sensible defaults.
//!
//! ## Configuration Variables
//!
//! - `DATABASE_URL`: Path to SQLite database file (default: `devit.db`)
//! - `BIND_ADDRESS`: HTTP server bind address (default: `0.0.0.0:3000`)
//! - `JWT_SECRET`: Shared secret for signing session tokens
//! - `ADMIN_USERNAME` / `ADMIN_PASSWORD`: Static admin console credentials

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "devit.db".to_string(),
            bind_address: "0.0.0.0:3000".to_string(),
            jwt_secret: "your-super-secret-jwt-key".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
        }
    }
}
