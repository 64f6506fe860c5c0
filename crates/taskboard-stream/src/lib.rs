//! # taskboard-stream - Update Stream Consumption
//!
//! Connects to the build daemon, decodes its length-delimited update
//! records, and applies them to the shared [`Dashboard`] under the
//! coalesce-and-dispatch discipline, with reconnect-and-reset on transport
//! failure.
//!
//! ## Public API
//!
//! - [`Dashboard`] - queue + identity map + status tree behind one mutex
//! - [`StreamReader`], [`ReaderConfig`] - the connect/decode/reconnect loop
//! - [`codec`] - length-delimited JSON framing helpers

pub mod codec;
pub mod dashboard;
pub mod reader;

pub use dashboard::{ChangeCallback, Dashboard};
pub use reader::{ReaderConfig, StreamReader};
