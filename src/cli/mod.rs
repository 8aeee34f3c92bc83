//! Command-line interface for resolving and opening URLs through delegates

pub mod connect;
pub mod resolve;

pub use connect::*;
pub use resolve::*;
