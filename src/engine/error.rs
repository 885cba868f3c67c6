use crate::fetcher::FetchError;

#[derive(Debug)]
pub enum EngineError {
    /// The upstream could not deliver occupancy for the requested day.
    Upstream(FetchError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Upstream(e) => write!(f, "failed to fetch occupancy: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Upstream(e) => Some(e),
        }
    }
}

impl From<FetchError> for EngineError {
    fn from(e: FetchError) -> Self {
        EngineError::Upstream(e)
    }
}
