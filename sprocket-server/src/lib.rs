//! # Sprocket Server
//!
//! HTTP surface for the Sprocket supervisor and for the child processes it
//! launches.
//!
//! - [`create_supervisor_app`] serves the run/list/status API, the observer
//!   WebSocket and `/health` over a shared [`Supervisor`].
//! - [`create_control_app`] serves a child's private `POST /cmd` endpoint.
//! - [`create_public_app`] serves a child's public `GET /` summary.
//!
//! [`Supervisor`]: sprocket_execution::Supervisor

pub mod app;
pub mod child;
pub mod errors;
pub mod handlers;

// Re-export commonly used types
pub use app::{create_supervisor_app, AppConfig};
pub use child::{create_control_app, create_public_app, ChildState};
pub use errors::{WebError, WebResult};
pub use handlers::{CommandRequest, PackageRequest};
