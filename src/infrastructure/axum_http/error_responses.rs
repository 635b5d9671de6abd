use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::application::usecases::subscriptions::SubscriptionError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for SubscriptionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            SubscriptionError::Validation(msg) => msg,
            SubscriptionError::NotFound => SubscriptionError::NotFound.to_string(),
            // Don't leak internal error detail to client
            SubscriptionError::Storage(_) => "Internal server error".to_string(),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
