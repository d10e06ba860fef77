//! REST API module
//!
//! Exposes the workflows over HTTP for the web console.

mod dto;
mod handlers;
mod server;

pub use dto::{CreateAppRequest, DcsConnectRequest, DeleteAppRequest, ErrorResponse};
pub use server::{router, run_server};
