#![forbid(unsafe_code)]

pub mod adapters;
pub mod gates;
pub mod pipeline;
pub mod power_plan;
pub mod remote;
pub mod retry;
pub mod state;
