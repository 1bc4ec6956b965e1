//! Common Infrastructure Module
//!
//! Shared configuration, logging and error types for the shielding portal.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{BtcRpcConfig, ConfigError, Network, ShieldConfig};
pub use error::{Result, ShieldError};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_request, log_api_response,
    log_registration_event, log_security_event, EventCategory, LogEvent, LogLevel, LoggingError,
};
