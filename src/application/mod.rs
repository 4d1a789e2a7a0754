//! Application services layer.

pub mod admin;
pub mod error;
