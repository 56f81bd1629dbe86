//! Data Models
//!
//! Contains all data structures used throughout the client.

pub mod event;
pub mod graph;
pub mod session;

pub use event::*;
pub use graph::*;
pub use session::*;
