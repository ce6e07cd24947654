//! The stat service surface: message shapes, a synchronous framed wire
//! protocol, the [`StatService`] client trait with a TCP implementation
//! and a configurable mock, and the development stat server.
//!
//! The filesystem core consumes only [`StatService::stat`]; snapshot
//! management shapes are part of the visible interface but not yet
//! integrated.

pub mod client;
pub mod proto;
pub mod server;
pub mod wire;

pub use client::{MockStatService, StatClient, StatService};
pub use proto::{StatRequest, StatResponse};
pub use server::StatServer;
pub use wire::Credentials;
