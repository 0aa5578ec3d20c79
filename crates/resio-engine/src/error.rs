use reqwest::StatusCode;

/// Errors fatal to a single `resolve` call.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid playback URI: {0}")]
    UriParse(String),

    #[error("No transport registered for scheme '{0}'")]
    UnsupportedProtocol(String),

    #[error("Failed to construct transport client: {0}")]
    Construction(#[from] reqwest::Error),
}

/// Runtime failures of an individual resolved source, surfaced to the
/// playback engine through the byte stream rather than the resolver.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
