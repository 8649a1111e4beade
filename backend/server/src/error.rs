use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sheets::SheetsError;
use thiserror::Error;
use tracing::error;

pub const MISSING_NAME: &str = "Vui lòng nhập họ tên";
pub const INVALID_PHONE: &str = "Số điện thoại phải gồm 10 chữ số";
pub const MISSING_CODE: &str = "Vui lòng nhập mã";
pub const MISSING_AMOUNT: &str = "Thiếu mệnh giá voucher";

/// Messages are shown to customers as is.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Dữ liệu gửi lên không hợp lệ")]
    MalformedPayload,

    #[error("{0}")]
    Validation(&'static str),

    #[error("Mã không hợp lệ")]
    InvalidCode,

    #[error("Mã đã hết lượt quay")]
    NoSpinsLeft,

    #[error("Số điện thoại này đã hết lượt quay")]
    PhoneExhausted,

    #[error("Mệnh giá voucher không hợp lệ")]
    InvalidAmount,

    #[error("Không tạo được mã, vui lòng thử lại")]
    CodeUnavailable,

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error("{1}")]
    Upstream(StatusCode, String),
}

impl AppError {
    /// Keeps the upstream status for endpoints that proxy the sheet directly.
    pub fn proxied(e: SheetsError) -> Self {
        match e.status().and_then(|status| StatusCode::from_u16(status).ok()) {
            Some(status) => AppError::Upstream(status, e.to_string()),
            None => AppError::Sheets(e),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload
            | AppError::Validation(_)
            | AppError::InvalidCode
            | AppError::NoSpinsLeft
            | AppError::PhoneExhausted
            | AppError::InvalidAmount => StatusCode::BAD_REQUEST,
            AppError::CodeUnavailable | AppError::Sheets(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(status, _) => *status,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(_: JsonRejection) -> Self {
        AppError::MalformedPayload
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
