use thiserror::Error;

/// Everything that can go wrong between reading the configuration and
/// getting rows back from the table endpoint.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not build HTTP client: {0}")]
    ClientBuild(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    #[error("table '{table}' not found: {message}")]
    TableNotFound { table: String, message: String },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProbeError {
    /// Stable tag used in machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidConfig(_) => "invalid_config",
            ProbeError::ClientBuild(_) => "client_build",
            ProbeError::Network(_) => "network",
            ProbeError::Unauthorized(_) => "unauthorized",
            ProbeError::TableNotFound { .. } => "table_not_found",
            ProbeError::ColumnNotFound(_) => "column_not_found",
            ProbeError::Service { .. } => "service",
            ProbeError::MalformedResponse(_) => "malformed_response",
        }
    }
}
