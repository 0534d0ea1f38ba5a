pub mod actions;
pub mod assembly;
pub mod asset;
pub mod certificate;
pub mod compose;
pub mod config;
pub mod database;
pub mod dns;
pub mod error;
pub mod iam;
pub mod io;
pub mod names;
pub mod network;
pub mod secrets;
pub mod security_group;
pub mod service;
pub mod stack;
pub mod template;

pub use compose::{compose, Deployment};
pub use error::{InfraError, Result};
