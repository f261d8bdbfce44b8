pub mod auth;
pub mod config;
pub mod db;
pub mod destination;
pub mod error;
pub mod google;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod tiering;
pub mod workers;

pub use workers::{default_handlers, JobExecution, JobHandler, Worker};
