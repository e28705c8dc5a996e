//! Simulated capture device speaking the same HTTP API as the real recorder.

pub mod device;
pub mod http;

pub use device::{SimConfig, SimDevice};
pub use http::{router, serve};
