//! HTTP API handlers for wos-core

pub mod batch_upload;
pub mod health;
pub mod layers;
pub mod objects;
pub mod search;

pub use batch_upload::batch_upload_routes;
pub use health::{health_routes, ping_routes};
pub use layers::layer_routes;
pub use objects::object_routes;
pub use search::search_routes;
