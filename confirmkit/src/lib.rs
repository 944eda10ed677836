#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for confirming payment sources against an orders API.
//!
//! A confirmation either completes in a single round trip or requires the
//! payer to authenticate on an external surface (a 3-D Secure challenge page
//! or the hosted PayPal checkout). In the second case control leaves the app,
//! and the outcome comes back later as a deep link that must be correlated
//! with the challenge that was started.
//!
//! This crate contains everything except the network: the request builder,
//! the response parser, the error taxonomy, challenge destinations, the
//! result correlator and the [`PaymentClient`](client::PaymentClient) façade
//! that sequences them over any [`Transport`](transport::Transport).
//!
//! # Modules
//!
//! - [`card`] - Card, billing address and confirmation request types
//! - [`challenge`] - Challenge destinations, metadata and the launcher seam
//! - [`client`] - The [`PaymentClient`](client::PaymentClient) façade
//! - [`config`] - Client configuration and API environments
//! - [`constants`] - Header names, paths and base URLs
//! - [`correlator`] - Single-slot pending challenge and deep-link correlation
//! - [`error`] - The [`SdkError`](error::SdkError) taxonomy
//! - [`listener`] - Exactly-once delivery of redirect outcomes
//! - [`request`] - Wire-level request construction
//! - [`response`] - Typed decoding of raw responses
//! - [`timestamp`] - Unix timestamps for pending challenges
//! - [`transport`] - The transport seam and raw response type
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod card;
pub mod challenge;
pub mod client;
pub mod config;
pub mod constants;
pub mod correlator;
pub mod error;
pub mod listener;
pub mod request;
pub mod response;
pub mod timestamp;
pub mod transport;

pub use client::{Delivery, PaymentClient};
pub use config::{CoreConfig, Environment};
pub use error::{ErrorDomain, ErrorKind, SdkError};
