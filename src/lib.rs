pub mod config;
pub mod coordinator;
pub mod debug;
pub mod errors;
pub mod models;
pub mod parser;
pub mod planner;
pub mod request;
pub mod sink;
pub mod transport;
pub mod utils;
