// Library root shared by the service binary and the integration tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod services;
pub mod utils;
pub mod web;
