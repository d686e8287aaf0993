use wayfare_shared::AppError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid search configuration: {0}")]
    Config(String),
    #[error("Failed to build search client: {0}")]
    Client(#[from] wayfare_gateway::GatewayError),
    #[error("Unexpected search response: {0}")]
    UnexpectedResponse(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let app = match &err {
            SearchError::Config(_) | SearchError::Client(_) => AppError::internal(err.to_string()),
            SearchError::UnexpectedResponse(_) => AppError::bad_gateway(err.to_string()).retryable(false),
            SearchError::Serialization(_) => AppError::internal(err.to_string()),
        };
        app.with_service("search")
    }
}
