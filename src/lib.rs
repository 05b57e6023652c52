//! bitvault - replicated bit preservation for web archives
//!
//! Checksum and bitarchive replicas exchange typed requests over a
//! reconnecting broker connection; the preservation reconciler compares
//! their state with the admin authority and repairs divergence.

pub mod batch;
pub mod bitarchive;
pub mod channels;
pub mod checksum;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod observability;
pub mod preservation;
pub mod protocol;
pub mod server;
pub mod transfer;
pub mod transport;
