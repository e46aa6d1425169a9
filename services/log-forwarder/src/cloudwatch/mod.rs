pub mod auth;
pub mod client;
pub mod creds;
pub mod models;
