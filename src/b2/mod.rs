//! Backblaze B2 backend

pub mod client;
pub mod types;

pub use client::B2Client;
