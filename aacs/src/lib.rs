#![allow(clippy::doc_overindented_list_items)]

mod config;
mod disc;
mod error;
mod mmc;
mod pipeline;
mod session;
mod unit;

pub use self::config::{resolve_config_path, ConfigFile, DiscEntry, HostCredential};
pub use self::disc::disc_hash;
pub use self::error::{AacsError, AacsResult};
pub use self::mmc::{MmcSession, NoMmc};
pub use self::session::AacsSession;

pub use aacs_core::Mkb;
