//! Read-through caching for expensive data fetches.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
