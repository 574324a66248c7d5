//! Welcome Gate — automatic member verification for Discord guilds.

pub mod config;
pub mod error;
pub mod ingest;
pub mod platform;
pub mod store;
pub mod verify;
