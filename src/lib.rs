pub mod auth;
pub mod aws;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod utils;
pub mod validation;
