pub mod client;
pub mod config;
pub mod i18n;
pub mod protocol;
pub mod relay;
pub mod retry;
pub mod translation;
