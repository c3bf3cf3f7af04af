//! Shared todo lists with timestamp-guarded concurrent item sync.
//!
//! Several clients can append, modify and remove items of the same list at
//! once. Each operation is stamped by the server clock and applied as one
//! guarded mutation; a modify or remove only lands if its timestamp is newer
//! than the one stored on the item.

pub mod config;
pub mod db;
pub mod models;
pub mod server;
pub mod sync;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
