//! Data models for wos-core

pub mod cid;
pub mod index_document;

pub use cid::Cid;
pub use index_document::{DocumentMetadata, DocumentOwner, IndexDocument, ObjectKind};
