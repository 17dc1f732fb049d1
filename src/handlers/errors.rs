use axum::{Json, http::StatusCode};
use tracing::error;

use crate::error::{ChainError, PortfolioError};
use crate::models::chain::ChainId;
use crate::models::token::ErrorResponse;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// Validation -> 400, unknown chain/protocol -> 404, anything else -> 500
pub fn portfolio_error(e: PortfolioError) -> ApiError {
    if e.is_validation() {
        return api_error(StatusCode::BAD_REQUEST, e.to_string());
    }
    match e {
        PortfolioError::UnsupportedChain(_) | PortfolioError::UnknownProtocol(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string())
        }
        other => {
            error!(error = %other, "Request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

pub fn chain_error(e: ChainError) -> ApiError {
    portfolio_error(PortfolioError::Chain(e))
}

/// Parse a `{chain}` path segment
pub fn parse_chain(raw: &str) -> Result<ChainId, ApiError> {
    raw.parse::<ChainId>()
        .map_err(|message| api_error(StatusCode::NOT_FOUND, message))
}
