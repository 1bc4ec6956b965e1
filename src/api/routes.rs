//! Route Handlers
//!
//! Each handler translates query or body parameters into a `ShieldService`
//! call and wraps the outcome in the `{Result, Error}` envelope.

use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::stats::{SharedRequestStats, StatsReport};
use super::types::{
    AddShieldingAddressParams, ApiResponse, CheckExistsParams, ExternalTxParams, HistoryParams,
    HistoryQuery, ListParams, ShieldingAddressView, ALREADY_INSERTED,
};
use crate::common::{Result, ShieldError};
use crate::service::{RegisterOutcome, SharedShieldService};
use crate::types::{ChainCode, DepositHistoryEntry, RegistrationRequest};

/// History result: a list for an account, a map for deposit keys
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryResult {
    List(Vec<DepositHistoryEntry>),
    ByDepositKey(BTreeMap<String, Vec<DepositHistoryEntry>>),
}

fn status_for(err: &ShieldError) -> StatusCode {
    match err {
        ShieldError::NoSuchDeposit(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ShieldError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(target: "shield::api", code = err.error_code(), error = %err, "request failed");
    }
    (status, Json(ApiResponse::<()>::err(err.to_string()))).into_response()
}

fn reply<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(ApiResponse::ok(value))).into_response(),
        Err(e) => error_response(e),
    }
}

fn bad_request(msg: String) -> Response {
    error_response(ShieldError::InvalidParams(msg))
}

/// GET /health
pub async fn handle_health(State(service): State<SharedShieldService>) -> Response {
    let report = service.health().await;
    (StatusCode::OK, Json(report)).into_response()
}

/// GET /stats
pub async fn handle_stats(State(stats): State<SharedRequestStats>) -> Json<StatsReport> {
    Json(stats.report().await)
}

/// GET /checkportalshieldingaddressexisted
pub async fn handle_check_exists(
    State(service): State<SharedShieldService>,
    params: std::result::Result<Query<CheckExistsParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };
    let chain_code = match params.chain_code() {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    reply(service.check_exists(&chain_code, &params.btcaddress).await)
}

/// POST /addportalshieldingaddress
pub async fn handle_add_shielding_address(
    State(service): State<SharedShieldService>,
    payload: std::result::Result<Json<AddShieldingAddressParams>, JsonRejection>,
) -> Response {
    let Json(params) = match payload {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };
    let request = match RegistrationRequest::try_from(params) {
        Ok(r) => r,
        Err(reason) => return error_response(reason.into()),
    };

    match service.register_deposit(request).await {
        Ok(RegisterOutcome::Registered) => reply(Ok(true)),
        Ok(RegisterOutcome::AlreadyRegistered) => (
            StatusCode::OK,
            Json(ApiResponse::<bool>::err(ALREADY_INSERTED)),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /getlistportalshieldingaddress
pub async fn handle_list_shielding_addresses(
    State(service): State<SharedShieldService>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };
    let records = service
        .list_registrations(params.from, params.to)
        .await
        .map(|records| {
            records
                .into_iter()
                .map(ShieldingAddressView::from)
                .collect::<Vec<_>>()
        });
    reply(records)
}

/// GET /getestimatedunshieldingfee
pub async fn handle_estimated_fee(State(service): State<SharedShieldService>) -> Response {
    reply(service.estimate_unshielding_fee().await)
}

/// POST /getshieldhistory
pub async fn handle_shield_history(
    State(service): State<SharedShieldService>,
    payload: std::result::Result<Json<HistoryParams>, JsonRejection>,
) -> Response {
    let Json(params) = match payload {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };
    if let Err(e) = service.check_token(&params.token_id) {
        return error_response(e);
    }

    let result = match params.query() {
        Ok(HistoryQuery::Account(account)) => service
            .get_history(&ChainCode::Account(account))
            .await
            .map(HistoryResult::List),
        Ok(HistoryQuery::DepositKeys(keys)) => service
            .get_history_for_deposit_keys(&keys)
            .await
            .map(HistoryResult::ByDepositKey),
        Err(e) => Err(e),
    };
    reply(result)
}

/// GET /getshieldhistorybyexternaltxid
pub async fn handle_history_by_external_tx(
    State(service): State<SharedShieldService>,
    params: std::result::Result<Query<ExternalTxParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };
    if let Err(e) = service.check_token(&params.tokenid) {
        return error_response(e);
    }
    reply(
        service
            .get_history_by_external_tx(&params.externaltxid)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use crate::validation::RejectReason;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RejectReason::AddressMismatch.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ShieldError::invalid_params("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ShieldError::NoSuchDeposit("account:A1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StorageError::Database("locked".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
