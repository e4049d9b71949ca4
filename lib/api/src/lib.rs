//! # Toolcat API
//!
//! REST surface over a [`toolcat_storage::StorageManager`]: attribute groups
//! and their options, the geography cascade, filter resolution and entity
//! detail.

pub mod rest;

pub use rest::{configure, RestApi};
