//! Startup errors with miette diagnostics, and exit codes.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use sorj_config::ConfigError;
use sorj_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const BIND: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum StartupError {
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(sorj::validation),
        help(
            "Fix the value in the config file, /data/options.json, or the matching\n\
             SORJ_* environment variable."
        )
    )]
    Validation { field: String, reason: String },

    #[error("Could not load settings")]
    #[diagnostic(
        code(sorj::config),
        help("Check the syntax of {path} and of any SORJ_* environment variables.")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(sorj::bind),
        help("Is another process using the port? Pick another with --bind or SORJ_BIND.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not set up the upstream client")]
    #[diagnostic(
        code(sorj::upstream),
        help("Check supervisor_url and the TLS settings (insecure, ca_cert).")
    )]
    Upstream(#[source] CoreError),

    #[error("Server stopped unexpectedly")]
    #[diagnostic(code(sorj::serve))]
    Serve(#[source] std::io::Error),
}

impl StartupError {
    /// Map a settings error, keeping field/reason validation failures flat.
    pub fn from_config(err: ConfigError, path: String) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            source @ ConfigError::Figment(_) => Self::Config { path, source },
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::Bind { .. } => exit_code::BIND,
            Self::Upstream(_) | Self::Serve(_) => exit_code::GENERAL,
        }
    }
}

impl From<CoreError> for StartupError {
    fn from(err: CoreError) -> Self {
        Self::Upstream(err)
    }
}
