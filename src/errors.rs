//! Error types used throughout the application.
//!
//! Two enums cover the taxonomy: [`process::ProcessError`] for fatal
//! startup/transport failures that never reach an HTTP response, and
//! [`proxy::ProxyError`] for the client-facing outcomes of a forwarded request.



//		Modules

pub mod process;
pub mod proxy;

pub use process::ProcessError;
pub use proxy::ProxyError;
