//! HTTP handlers.
//!
//! `items` is the CRUD surface under `/api/items`, `diagnostics` reports on
//! the store connection, and `actuator` carries health, info and metrics for
//! the platform.
pub mod actuator;
pub mod diagnostics;
pub mod items;
pub mod types;
