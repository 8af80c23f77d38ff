// Library exports for testing and reuse

pub mod app;
pub mod auth_token;
pub mod config;
pub mod db;
pub mod error;
pub mod guards;
pub mod handlers;
pub mod middleware;
pub mod pagination;
pub mod services;
