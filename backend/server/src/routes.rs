use std::{ops::Not, sync::Arc};

use axum::{
    Json,
    extract::{self, Query, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sheets::{RowStore, Rows};

use crate::{
    campaign::SpendRequest,
    error::{AppError, MISSING_AMOUNT},
    state::State,
    utils::parse_amount,
};

pub const DEFAULT_SHEET_DATA_RANGE: &str = "Trang1!A2:C50";

type AppState<S> = extract::State<Arc<State<S>>>;

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct RegisterResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Not::not")]
    pub reused: bool,
}

#[derive(Deserialize, Debug)]
pub struct RedeemRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Ack {
    fn ok() -> Self {
        Self { ok: true, code: None }
    }
}

#[derive(Deserialize, Debug)]
pub struct LogVoucherRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub amount: Value,
    pub message: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Deserialize, Debug)]
pub struct SpinRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct SpinResponse {
    pub ok: bool,
    pub amount: u64,
    pub message: String,
}

#[derive(Deserialize)]
pub struct SheetDataQuery {
    pub range: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SheetData {
    pub values: Rows,
}

pub async fn register_handler<S: RowStore>(
    extract::State(state): AppState<S>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let Json(payload) = payload?;

    let registration = state
        .campaign
        .register(&payload.name, &payload.phone)
        .await?;

    Ok(Json(RegisterResponse {
        code: registration.code,
        reused: registration.reused,
    }))
}

pub async fn redeem_handler<S: RowStore>(
    extract::State(state): AppState<S>,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let Json(payload) = payload?;

    let code = state.campaign.redeem(&payload.code).await?;

    Ok(Json(Ack {
        ok: true,
        code: Some(code),
    }))
}

pub async fn log_voucher_handler<S: RowStore>(
    extract::State(state): AppState<S>,
    payload: Result<Json<LogVoucherRequest>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let Json(payload) = payload?;

    let amount = match &payload.amount {
        Value::Null => return Err(AppError::Validation(MISSING_AMOUNT)),
        amount => parse_amount(amount).ok_or(AppError::InvalidAmount)?,
    };

    state
        .campaign
        .spend(SpendRequest {
            code: payload.code,
            amount: Some(amount),
            message: payload.message,
            name: payload.name,
            phone: payload.phone,
        })
        .await?;

    Ok(Json(Ack::ok()))
}

pub async fn spin_handler<S: RowStore>(
    extract::State(state): AppState<S>,
    payload: Result<Json<SpinRequest>, JsonRejection>,
) -> Result<Json<SpinResponse>, AppError> {
    let Json(payload) = payload?;

    let spend = state
        .campaign
        .spend(SpendRequest {
            code: payload.code,
            amount: None,
            message: None,
            name: payload.name,
            phone: payload.phone,
        })
        .await?;

    Ok(Json(SpinResponse {
        ok: true,
        amount: spend.amount,
        message: spend.message,
    }))
}

pub async fn sheet_data_handler<S: RowStore>(
    extract::State(state): AppState<S>,
    Query(query): Query<SheetDataQuery>,
) -> Result<Json<SheetData>, AppError> {
    let range = query
        .range
        .filter(|range| !range.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SHEET_DATA_RANGE.to_string());

    let values = state
        .sheets
        .read_with_key(&range)
        .await
        .map_err(AppError::proxied)?;

    Ok(Json(SheetData { values }))
}

pub async fn health_handler() -> Json<Ack> {
    Json(Ack::ok())
}
