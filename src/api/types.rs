//! HTTP Request and Response Shapes
//!
//! Every response body is `{"Result": <value|null>, "Error": <string|null>}`.

use serde::{Deserialize, Serialize};

use crate::common::ShieldError;
use crate::types::{ChainCode, DepositRecord, RegistrationRequest};
use crate::validation::RejectReason;

/// Message returned for a re-submitted registration
pub const ALREADY_INSERTED: &str = "record has already been inserted";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "Result")]
    pub result: Option<T>,
    #[serde(rename = "Error")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// POST /addportalshieldingaddress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddShieldingAddressParams {
    #[serde(rename = "IncAddress", default)]
    pub inc_address: Option<String>,
    #[serde(rename = "OTDepositPubKey", default)]
    pub deposit_pub_key: Option<String>,
    #[serde(rename = "Receivers", default)]
    pub receivers: Vec<String>,
    #[serde(rename = "Signatures", default)]
    pub signatures: Vec<String>,
    #[serde(rename = "BTCAddress")]
    pub btc_address: String,
}

impl TryFrom<AddShieldingAddressParams> for RegistrationRequest {
    type Error = RejectReason;

    fn try_from(p: AddShieldingAddressParams) -> Result<Self, Self::Error> {
        RegistrationRequest::from_parts(
            p.inc_address,
            p.deposit_pub_key,
            p.receivers,
            p.signatures,
            p.btc_address,
        )
    }
}

/// GET /checkportalshieldingaddressexisted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckExistsParams {
    pub incaddress: Option<String>,
    pub depositpubkey: Option<String>,
    #[serde(default)]
    pub btcaddress: String,
}

impl CheckExistsParams {
    /// The account address wins when both are supplied
    pub fn chain_code(&self) -> Result<ChainCode, ShieldError> {
        if self.btcaddress.is_empty() {
            return Err(ShieldError::invalid_params("`btcaddress` must be supplied"));
        }
        match (non_empty(&self.incaddress), non_empty(&self.depositpubkey)) {
            (Some(account), _) => Ok(ChainCode::Account(account.to_string())),
            (None, Some(key)) => Ok(ChainCode::DepositKey(key.to_string())),
            (None, None) => Err(ShieldError::invalid_params(
                "either `incaddress` or `depositpubkey` must be supplied",
            )),
        }
    }
}

/// GET /getlistportalshieldingaddress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
}

/// POST /getshieldhistory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "IncAddress", default)]
    pub inc_address: Option<String>,
    #[serde(rename = "OTDepositPubKeys", default)]
    pub deposit_pub_keys: Vec<String>,
    #[serde(rename = "TokenID", default)]
    pub token_id: String,
}

/// What a history request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryQuery {
    Account(String),
    DepositKeys(Vec<String>),
}

impl HistoryParams {
    pub fn query(&self) -> Result<HistoryQuery, ShieldError> {
        if let Some(account) = non_empty(&self.inc_address) {
            return Ok(HistoryQuery::Account(account.to_string()));
        }
        if self.deposit_pub_keys.is_empty() {
            return Err(ShieldError::invalid_params(
                "either `IncAddress` or `OTDepositPubKeys` must be supplied",
            ));
        }
        Ok(HistoryQuery::DepositKeys(self.deposit_pub_keys.clone()))
    }
}

/// GET /getshieldhistorybyexternaltxid
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalTxParams {
    #[serde(default)]
    pub externaltxid: String,
    #[serde(default)]
    pub tokenid: String,
}

/// Registration as listed by /getlistportalshieldingaddress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldingAddressView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incaddress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depositpubkey: Option<String>,
    pub btcaddress: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub receivers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub signatures: Vec<String>,
    pub timestamp: i64,
}

impl From<DepositRecord> for ShieldingAddressView {
    fn from(record: DepositRecord) -> Self {
        let (incaddress, depositpubkey) = match record.chain_code {
            ChainCode::Account(a) => (Some(a), None),
            ChainCode::DepositKey(k) => (None, Some(k)),
        };
        Self {
            incaddress,
            depositpubkey,
            btcaddress: record.btc_address,
            receivers: record.receivers,
            signatures: record.signatures,
            timestamp: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_field_names() {
        let json = serde_json::to_value(ApiResponse::ok(true)).unwrap();
        assert_eq!(json, serde_json::json!({"Result": true, "Error": null}));

        let json = serde_json::to_value(ApiResponse::<()>::err(ALREADY_INSERTED)).unwrap();
        assert_eq!(json["Error"], ALREADY_INSERTED);
        assert!(json["Result"].is_null());
    }

    #[test]
    fn test_add_params_conversion() {
        let params: AddShieldingAddressParams = serde_json::from_value(serde_json::json!({
            "IncAddress": "A1",
            "BTCAddress": "tb1q",
        }))
        .unwrap();
        let request = RegistrationRequest::try_from(params).unwrap();
        assert_eq!(request.chain_code(), ChainCode::Account("A1".into()));

        let both = AddShieldingAddressParams {
            inc_address: Some("A1".into()),
            deposit_pub_key: Some("K1".into()),
            btc_address: "tb1q".into(),
            ..Default::default()
        };
        assert_eq!(
            RegistrationRequest::try_from(both),
            Err(RejectReason::AmbiguousChainCode)
        );
    }

    #[test]
    fn test_check_params() {
        let params = CheckExistsParams {
            incaddress: Some("A1".into()),
            depositpubkey: Some("K1".into()),
            btcaddress: "tb1q".into(),
        };
        assert_eq!(params.chain_code().unwrap(), ChainCode::Account("A1".into()));

        let missing_address = CheckExistsParams {
            depositpubkey: Some("K1".into()),
            ..Default::default()
        };
        assert!(missing_address.chain_code().is_err());
    }

    #[test]
    fn test_history_query() {
        let params = HistoryParams {
            deposit_pub_keys: vec!["K1".into(), "K2".into()],
            token_id: "t".into(),
            ..Default::default()
        };
        assert_eq!(
            params.query().unwrap(),
            HistoryQuery::DepositKeys(vec!["K1".into(), "K2".into()])
        );
        assert!(HistoryParams::default().query().is_err());
    }
}
