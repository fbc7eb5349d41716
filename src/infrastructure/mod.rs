//! Storage implementations of the repository contracts

pub mod repositories;
