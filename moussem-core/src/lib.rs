pub mod catalog;
pub mod common;
pub mod domain;

pub use common::error::{CatalogError, Result};
