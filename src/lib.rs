//! Rust Forward Delegate - pluggable URL interception with sentinel forwarding
//!
//! Delegates claim URLs and rewrite them; the shared forward step renames the
//! `http` protocol to `forward` and opens the connection, directly or through
//! an HTTP/SOCKS5 proxy.

pub mod cli;
pub mod config;
pub mod connect;
pub mod delegate;
pub mod error;
pub mod logging;
pub mod models;
pub mod utils;

// Re-export commonly used items
pub use config::DelegateConfig;
pub use connect::{
    Connection, Opener, OpenerRegistry, Proxy, ProxyKind, TcpOpener, FORWARD_PROTOCOL,
};
pub use delegate::{
    forward, forward_url, forward_with, Delegate, DelegateExt, Dispatcher, Resolution,
    RewriteDelegate, RewriteRule, SelectionPolicy,
};
pub use error::{Error, Result};
pub use logging::{
    init_logger, init_logger_with_config, init_logger_with_env, log_debug, log_error, log_info,
    log_trace, log_warning,
};
pub use models::ConnectLog;
