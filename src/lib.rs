pub mod app;
pub mod authz;
pub mod certs;
pub mod collaborator;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod models;
pub mod routes;
pub mod signing;
pub mod storage;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{create_app, create_app_with, AppState};
