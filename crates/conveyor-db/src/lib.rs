//! Storage layer for the conveyor task queue: configuration, pooling,
//! migrations, row models, and the SQL query functions the dispatch core
//! is built on.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
