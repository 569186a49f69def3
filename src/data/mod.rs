//! Postgres queries backing [`crate::store::PgStore`].

pub mod facilities;
pub mod kv;
pub mod terms;
