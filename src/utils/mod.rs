//! Utility functions for the delegate layer

pub mod time;
pub mod url;

pub use self::time::*;
pub use self::url::*;
