//! Music catalog client module

pub mod client;
pub mod models;

pub use client::{Catalog, HttpCatalogClient};
pub use models::*;
