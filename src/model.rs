//! Core data model.
//!
//! A request is something that needs fetching. The queue stores, moves and
//! hands out requests without interpreting them.

pub mod request;

pub use request::{Request, RequestId};
