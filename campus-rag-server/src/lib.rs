//! `campus-rag-server` exposes the campus knowledge base and dropout risk
//! analysis over HTTP.

pub mod server;

pub use server::{AppState, ServerConfig, app_router, run_server};
