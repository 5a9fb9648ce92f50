//! HTTP transport shared by the upstream provider drivers.

pub mod http;

pub use http::{HttpTransport, TransportError};
