mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from coinsum for tests
pub use coinsum::{
    CoinDetector, CoinError, CoinKind, DetectionReport, DetectorConfig, Resources, Variant,
};
