pub mod api;
pub mod args;
pub mod auth;
pub mod commands;
mod config;
mod db;
pub mod directory;
mod error;
pub mod formula;
pub mod model;
pub mod server;
pub mod summary;
pub mod table;
mod utils;


pub use api::Mode;
pub use config::Config;
pub use db::Db;
pub use error::Error;
pub use error::Result;
