pub mod api;
pub mod config;
pub mod device;
pub mod http_client;
pub mod mail_client;
pub mod services;
