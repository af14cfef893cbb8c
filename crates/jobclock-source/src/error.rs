use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or service failure. Retry at whole-cycle granularity.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// The service answered with something that is not a search response.
    #[error("unparseable search response: {0}")]
    Protocol(String),
    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
