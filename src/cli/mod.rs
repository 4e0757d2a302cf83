pub mod commands;
pub mod settings;
pub mod telemetry;

mod start;
pub use self::start::{start, start_from};
