//! # WOS Common Library
//!
//! Shared code for the World Object Store services including:
//! - Error taxonomy (validation / not-found / resource / store)
//! - Service configuration loading
//! - Database schema and row models
//! - Geographic point type (WGS84)

pub mod config;
pub mod db;
pub mod error;
pub mod geo;

pub use error::{Error, Result};
pub use geo::Location;
