pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod overlay;
pub mod pipeline;

pub use config::DetectorConfig;
pub use detection::{build_pipeline, CoinDetector, Resources, Variant};
pub use error::{CoinError, CoinResult};
pub use models::{Circle, CoinDetection, CoinKind, DetectionReport, Tally};
pub use overlay::{Annotator, OverlayStyle};
pub use pipeline::{
    Pipeline, PipelineData, PipelineStep, PipelineContext,
    BoundingBox, MetadataValue, WorkItem, PipelineExecutor, DebugConfig
};
