// API errors and their HTTP mapping
use crate::domain::error::AnalysisError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(detail) | ApiError::NotFound(detail) => detail.clone(),
            ApiError::Internal(e) => e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<AnalysisError>() {
            Some(
                AnalysisError::UnknownCircuit(_)
                | AnalysisError::NoLapData { .. }
                | AnalysisError::LapNotFound { .. },
            ) => ApiError::NotFound(e.to_string()),
            Some(
                AnalysisError::MissingColumn { .. }
                | AnalysisError::InvalidVehicleId(_)
                | AnalysisError::InputMalformed(_),
            ) => ApiError::BadRequest(e.to_string()),
            None => ApiError::Internal(e),
        }
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        ApiError::Internal(anyhow::anyhow!("Failed to encode response ({})", status))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        match &self {
            ApiError::Internal(e) => error!("Request failed: {:#}", e),
            _ => warn!("Request rejected ({}): {}", status, detail),
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_domain_errors() {
        let not_found: ApiError =
            anyhow::Error::from(AnalysisError::UnknownCircuit("monaco".into())).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let lap: ApiError = anyhow::Error::from(AnalysisError::LapNotFound {
            chassis: "002".into(),
            car_number: 2,
            lap: 42,
        })
        .into();
        assert_eq!(lap.status(), StatusCode::NOT_FOUND);

        let malformed: ApiError = anyhow::Error::from(AnalysisError::MissingColumn {
            column: "vehicle_id".into(),
            file: "lap_time.csv".into(),
        })
        .into();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let other: ApiError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_domain_error_behind_context_still_maps() {
        let err = anyhow::Error::from(AnalysisError::InvalidVehicleId("GR86".into()))
            .context("loading lap events");
        let api: ApiError = err.into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_body_carries_detail() {
        let response = ApiError::NotFound("Circuit not found: monaco".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Circuit not found: monaco");
    }
}
