//! Configuration Module
//!
//! Configuration loading for the session authority and monitor binary.

mod settings;

pub use settings::{
    ConfigError, Environment, MonitorConfig, SeedCredentials, ServerSettings, SessionSettings,
};
