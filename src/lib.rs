pub mod board;
pub mod config;
pub mod errors;
pub mod server;
pub mod telemetry;
