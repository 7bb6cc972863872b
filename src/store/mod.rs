mod commands;
mod gateway;
mod handle;
mod queries;
mod schema;

pub use gateway::MailStore;
pub use handle::StoreHandle;
