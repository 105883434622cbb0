// ============================================================================
// DataDrive Library
// ============================================================================

pub mod backend;
pub mod config;
pub mod core;
pub mod platforms;
pub mod web;

pub use backend::Backends;
pub use config::AppConfig;
pub use core::{ConnectionDescriptor, DriveError, NormalizedResult, Platform, Record, RequestContext, Result};
pub use platforms::{PlatformHandle, QueryPlan, dispatch, fetch_and_release};
pub use web::{AppState, build_router};
