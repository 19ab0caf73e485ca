pub mod config;
pub mod error;

pub mod lookup;
pub mod services;
