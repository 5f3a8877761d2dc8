pub mod config;
pub mod db;
pub mod errors;
pub mod interval;
pub mod logging;
pub mod pipeline;
