pub mod config;
pub mod envelope;
pub mod models;
pub mod navigator;
pub mod pipelines;
pub mod providers;
pub mod service;
pub mod speech;

pub use config::NavigatorConfig;
pub use envelope::ResponsePayload;
pub use navigator::{Navigator, PipelineKind, PipelineRequest, PipelineResult};
pub use service::{AppState, build_router, create_app};
pub use models::*;
