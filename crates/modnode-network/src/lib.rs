//! Network layer for the modnode peripheral node.
//!
//! Two directions of traffic:
//!
//! - **Outbound**: [`CoordinatorClient`] posts the module inventory to the
//!   coordinator. It implements [`ReportTransport`], the seam used by the
//!   reporter's retry logic.
//! - **Inbound**: [`ApiServer`] serves the local HTTP API, an axum
//!   [`router`] whose handlers call into any [`ModuleApi`] implementation.

pub mod api;
pub mod client;
pub mod error;
pub mod server;

pub use api::{ApiError, ModuleApi, router, status_for};
pub use client::{
    CoordinatorClient, CoordinatorClientConfig, ReportEntry, ReportTransport, build_request,
    parse_status_line,
};
pub use error::{ClientError, ServerError};
pub use server::{ApiServer, ApiServerConfig};
