//! Garage Core
//!
//! Resource model, attribute schemas and the provider trait shared by the
//! Garage provider and its command-line driver.

pub mod provider;
pub mod resource;
pub mod schema;
