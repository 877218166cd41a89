//! HTTP request handlers

pub mod ask;
pub mod health;

pub use ask::*;
pub use health::*;
