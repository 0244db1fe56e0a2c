//! vipconnect - AnyConnect VPN wrapper with Symantec VIP second factor
//!
//! This crate drives an existing VPN command-line client and an existing TOTP
//! tool. It never implements a VPN protocol or the TOTP algorithm itself.
//!
//! # Architecture
//!
//! - `app`: Command dispatcher (validation, dependency check, lock, operations)
//! - `config`: Configuration file handling (TOML)
//! - `deps`: Checks that the client, TOTP tool and secret file exist
//! - `lock`: Single-instance guard for connect/disconnect
//! - `vipcode`: Secret file parsing and code generation
//! - `client`: External VPN client and the scripted connect exchange
//! - `notify`: Desktop notifications
//!
//! # Usage
//!
//! ```bash
//! vipconnect connect -u USERNAME -p PASSWORD vpn.example.com
//! vipconnect status
//! vipconnect vipcode
//! vipconnect disconnect
//! ```

pub mod app;
pub mod client;
pub mod config;
pub mod deps;
pub mod lock;
pub mod notify;
pub mod vipcode;

pub use app::{App, AppError, Request};
pub use config::Config;
