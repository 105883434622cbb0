pub mod context;
pub mod descriptor;
pub mod error;
pub mod ident;
pub mod platform;
pub mod result;

pub use context::RequestContext;
pub use descriptor::ConnectionDescriptor;
pub use error::{DriveError, Result};
pub use platform::Platform;
pub use result::{NormalizedResult, Record};
