pub mod load_config;
pub mod names;
pub mod shutdown;
