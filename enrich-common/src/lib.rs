//! # Enrich Common Library
//!
//! Shared code for the enrichment workspace:
//! - Error and result types
//! - Configuration file loading and root folder resolution
//! - Clock abstraction used for TTL bookkeeping

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
