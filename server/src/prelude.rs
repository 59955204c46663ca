pub use crate::core::app::App;
pub use crate::error::{ApiResult, Error};
pub use crate::types::{Patch, Timestamp, WsRid};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
