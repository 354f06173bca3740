pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod session;

pub use cache::{AnalysisCache, CacheKey};
pub use classify::{ErrorKind, PositionAnalysis};
pub use config::AnalyzerConfig;
pub use error::AnalyzerError;
pub use orchestrator::analyze_batch;
