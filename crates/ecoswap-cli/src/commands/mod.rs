pub mod common;
pub mod listings;
pub mod nearby;
pub mod status;
pub mod sync;
pub mod trade;
pub mod uploads;
