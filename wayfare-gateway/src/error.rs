use wayfare_shared::AppError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid vendor configuration: {0}")]
    Config(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::internal(err.to_string()).with_service("gateway")
    }
}
