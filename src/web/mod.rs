//! JSON API over the facility and term stores.

pub mod admin;
pub mod error;
pub mod facilities;
pub mod routes;
pub mod status;
pub mod terms;

pub use routes::*;
