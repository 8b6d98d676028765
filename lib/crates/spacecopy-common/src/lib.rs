pub mod models;
pub mod summary;

pub use models::*;
pub use summary::{
    AppCopyResult, ContextRef, CopySummary, ServiceCopyKind, ServiceCopyResult, SkippedRoute,
};
