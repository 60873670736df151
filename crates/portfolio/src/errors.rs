use thiserror::Error;

/// Typed error hierarchy for the portfolio engine.
///
/// Library-internal errors use specific variants; the binary wraps with
/// `anyhow::Context` for propagation. Numeric parse failures never surface
/// here: formatters and converters recover from them locally.
#[derive(Error, Debug)]
pub enum PortfolioError {
    // -- Transport ----------------------------------------------------------
    #[error("upstream request failed: {reason}")]
    Transport { reason: String },

    #[error("upstream returned HTTP {status} for {endpoint}")]
    UpstreamStatus { endpoint: String, status: u16 },

    #[error("GraphQL error: {message}")]
    GraphQl { message: String },

    #[error("malformed upstream response: {reason}")]
    MalformedResponse { reason: String },

    #[error("chain {chain_id} is not supported")]
    UnsupportedChain { chain_id: u64 },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    /// Transient failures are worth another attempt on the next poll cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Reqwest(_) | Self::Io(_) => true,
            Self::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
