//! HTTP transport for the confirmkit payment confirmation client.
//!
//! Provides a [`confirmkit::transport::Transport`] backed by `reqwest`.
//!
//! # Modules
//!
//! - [`error`]: errors raised while building a transport
//! - [`transport`]: the `reqwest` transport (feature: `client`)

pub mod error;

#[cfg(feature = "client")]
pub mod transport;

pub use error::TransportBuildError;
#[cfg(feature = "client")]
pub use transport::ReqwestTransport;
