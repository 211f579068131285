pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod gbdt;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod server;
pub mod storage;
pub mod trainer;

pub use engine::{Classification, DetectionEngine};
pub use error::AppError;
