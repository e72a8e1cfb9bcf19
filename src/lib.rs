pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod docs;
pub mod domain;
pub mod error;
pub mod model;
pub mod models;
pub mod routes;
pub mod utils;
