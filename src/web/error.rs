use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::run::RunError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Run(#[from] RunError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Run(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            AppError::Run(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status(),
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
