//! Database access layer for wos-core

pub mod layers;
pub mod media_uploads;
pub mod objects;
