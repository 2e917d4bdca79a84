use thiserror::Error;

/// Errors produced by the dashboard engines and the provider adapters.
#[derive(Debug, Error)]
pub enum Error {
    /// A unit name or symbol outside the supported systems.
    #[error("Unsupported unit '{0}'. Supported unit systems: imperial, metric, standard.")]
    UnsupportedUnit(String),

    /// The keyed provider had no credential or the upstream rejected it.
    #[error("Authentication with provider '{provider}' failed: {reason}")]
    Authentication { provider: String, reason: String },

    /// A field the record cannot be built without is absent from the payload.
    #[error("Upstream payload from '{provider}' is missing field '{field}'")]
    UpstreamFieldMissing {
        provider: &'static str,
        field: &'static str,
    },

    /// One row of the birthday CSV could not be used.
    #[error("Skipping birthday row {line}: {reason}")]
    MalformedBirthdayRow { line: u64, reason: String },

    #[error("Invalid date '{value}': expected {expected}")]
    InvalidDate {
        value: String,
        expected: &'static str,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} request failed with status {status}: {body}")]
    UpstreamStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode upstream payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Failed to read birthday CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to open birthday CSV {path}: {source}")]
    BirthdayFile {
        path: String,
        source: std::io::Error,
    },
}

impl Error {
    /// Whether a caller should retry the request with the no-key provider.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
