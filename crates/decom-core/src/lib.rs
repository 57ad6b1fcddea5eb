#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod hostname;
pub mod schema;
pub mod state;
pub mod target;
pub mod traits;
pub mod types;
