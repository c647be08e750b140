//! ecoswap-core - Core library for EcoSwap
//!
//! This crate contains the local cache, delta sync engine, photo upload
//! pipeline, trade lifecycle and proximity matching shared by all
//! EcoSwap clients.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod proximity;
pub mod remote;
pub mod sync;
pub mod trade;
pub mod upload;
pub mod util;

pub use error::{Error, Result};
pub use models::{Listing, ListingId, Trade, TradeId};
