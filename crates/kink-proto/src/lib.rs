pub mod config;
pub mod history;
pub mod platform;
pub mod protocol;
pub mod state;
