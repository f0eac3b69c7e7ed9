//! Route handlers organized by resource

pub mod export;
pub mod health;
pub mod tweets;
