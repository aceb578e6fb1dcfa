//! Business-license collaborators: the tax-service status check and the
//! gym matcher.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::extractor::BusinessLicenseRecord;

/// Registration status reported by the tax service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessStatus {
    /// `01`: registration details match an operating business.
    Active,
    /// `02`: the business is reported closed.
    Closed,
    /// Any other code.
    Invalid(String),
}

impl BusinessStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "01" => Self::Active,
            "02" => Self::Closed,
            other => Self::Invalid(other.to_string()),
        }
    }

    /// Message sent back in `business_license_response`.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Active => "트레이너 등록에 성공했습니다",
            Self::Closed => "폐업한 사업자 입니다",
            Self::Invalid(_) => "유효하지 않은 사업자 등록 정보입니다",
        }
    }
}

#[async_trait::async_trait]
pub trait BusinessValidator: Send + Sync {
    async fn validate(&self, record: &BusinessLicenseRecord) -> Result<BusinessStatus>;
}

/// Client for the national tax service business-status `validate` API.
pub struct NtsBusinessValidator {
    client: reqwest::Client,
    url: String,
    service_key: String,
}

impl NtsBusinessValidator {
    pub fn new(client: reqwest::Client, url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            service_key: service_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    data: Vec<ValidateEntry>,
}

#[derive(Deserialize)]
struct ValidateEntry {
    #[serde(default)]
    valid: String,
}

fn validate_request(record: &BusinessLicenseRecord) -> serde_json::Value {
    json!({
        "businesses": [{
            "b_no": record.registration_number,
            "start_dt": record.opening_date,
            "p_nm": record.representative,
            "b_nm": record.trade_name.clone().unwrap_or_default(),
        }]
    })
}

fn status_from_response(resp: ValidateResponse) -> BusinessStatus {
    let code = resp
        .data
        .into_iter()
        .next()
        .map(|entry| entry.valid)
        .unwrap_or_default();
    BusinessStatus::from_code(&code)
}

#[async_trait::async_trait]
impl BusinessValidator for NtsBusinessValidator {
    async fn validate(&self, record: &BusinessLicenseRecord) -> Result<BusinessStatus> {
        let resp: ValidateResponse = self
            .client
            .post(&self.url)
            .query(&[("serviceKey", &self.service_key)])
            .json(&validate_request(record))
            .send()
            .await
            .context("Business validation request failed")?
            .error_for_status()
            .context("Business validation returned error status")?
            .json()
            .await
            .context("Failed to parse business validation response")?;

        let status = status_from_response(resp);
        info!(
            "Business {} validation status: {:?}",
            record.registration_number, status
        );
        Ok(status)
    }
}

/// A gym matched to a business license.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GymMatch {
    pub gym_id: i64,
}

#[async_trait::async_trait]
pub trait GymMatcher: Send + Sync {
    async fn find_most_similar_gym(&self, record: &BusinessLicenseRecord) -> Result<Option<GymMatch>>;
}

/// Matcher service reached over HTTP.
pub struct HttpGymMatcher {
    client: reqwest::Client,
    url: String,
}

impl HttpGymMatcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct GymQuery<'a> {
    name: Option<&'a str>,
    address: Option<&'a str>,
    representative: &'a str,
}

#[derive(Deserialize)]
struct GymMatchResponse {
    gym_id: Option<i64>,
}

#[async_trait::async_trait]
impl GymMatcher for HttpGymMatcher {
    async fn find_most_similar_gym(&self, record: &BusinessLicenseRecord) -> Result<Option<GymMatch>> {
        let query = GymQuery {
            name: record.trade_name.as_deref(),
            address: record.address.as_deref(),
            representative: &record.representative,
        };

        let resp: GymMatchResponse = self
            .client
            .post(&self.url)
            .json(&query)
            .send()
            .await
            .context("Gym matcher request failed")?
            .error_for_status()
            .context("Gym matcher returned error status")?
            .json()
            .await
            .context("Failed to parse gym matcher response")?;

        debug!("Gym matcher answered {:?}", resp.gym_id);
        Ok(resp.gym_id.map(|gym_id| GymMatch { gym_id }))
    }
}

/// Used when no matcher endpoint is configured.
pub struct NoGymMatcher;

#[async_trait::async_trait]
impl GymMatcher for NoGymMatcher {
    async fn find_most_similar_gym(&self, _record: &BusinessLicenseRecord) -> Result<Option<GymMatch>> {
        Ok(None)
    }
}
