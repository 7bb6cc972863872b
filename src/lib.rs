pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod imap;
pub mod models;
pub mod smtp;
pub mod store;
pub mod webmail;

pub use error::{Error, Result, StoreError};
pub use store::{MailStore, StoreHandle};
