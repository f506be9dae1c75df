use thiserror::Error;

/// Error taxonomy for the discovery pipeline. The variants mirror how each
/// failure is handled: upstream outages fail the job, extraction shortfalls
/// and missing fields are recovered locally, embedding failures leave the
/// record vector-less for a later backfill pass.
#[derive(Error, Debug)]
pub enum FundScoutError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Extraction returned {got} items for {expected} URLs")]
    PartialExtractionShortfall { expected: usize, got: usize },

    #[error("Invalid or missing field: {0}")]
    InvalidOrMissingField(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Extraction poll timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
