//! Certificate registry verification.
//!
//! The registry answers with loosely-typed JSON. Everything about its shape
//! stays in this module: callers only see [`VerificationResult`].

use anyhow::Context;
use image::RgbImage;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::storage::{encode_png, ImageStore};

/// Error code the registry returns when no certificate matches.
const NO_DATA_CODE: &str = "ERR_COMM_201";

pub const NO_RESPONSE_MESSAGE: &str = "API 응답이 없습니다. 서버 문제일 수 있습니다.";
pub const UNKNOWN_ERROR_MESSAGE: &str = "알 수 없는 오류가 발생했습니다.";
pub const NOT_FOUND_MESSAGE: &str = "해당 데이터가 없습니다.";

/// A certificate as the registry knows it, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub cert_number: String,
    pub name: String,
    pub level: String,
    pub category: String,
    pub acquisition_date: String,
}

/// Outcome of one registry lookup, before any image is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLookup {
    Found(RegistryEntry),
    NotFound,
    Transient(String),
}

/// Final verification outcome handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Success {
        entry: RegistryEntry,
        /// `None` when the masked image could not be stored.
        image_url: Option<String>,
    },
    NotFound,
    TransientError { message: String },
}

#[derive(Deserialize)]
struct ProviderEntry {
    #[serde(rename = "QF_NO")]
    qf_no: String,
    #[serde(rename = "USR_NM")]
    usr_nm: String,
    #[serde(rename = "QF_GRADE_NM")]
    qf_grade_nm: String,
    #[serde(rename = "QF_ITM_NM")]
    qf_itm_nm: String,
    #[serde(rename = "AQ_DT")]
    aq_dt: String,
}

impl From<ProviderEntry> for RegistryEntry {
    fn from(e: ProviderEntry) -> Self {
        Self {
            cert_number: e.qf_no,
            name: e.usr_nm,
            level: e.qf_grade_nm,
            category: e.qf_itm_nm,
            acquisition_date: e.aq_dt,
        }
    }
}

/// Map every observed registry body shape onto a [`RegistryLookup`].
///
/// Precedence: non-object body, then the no-data code, then a populated
/// result list; anything else is an unknown failure.
pub fn classify_response(body: &Value) -> RegistryLookup {
    let Some(object) = body.as_object() else {
        return RegistryLookup::Transient(NO_RESPONSE_MESSAGE.to_string());
    };

    if object.get("msgCd").and_then(Value::as_str) == Some(NO_DATA_CODE) {
        return RegistryLookup::NotFound;
    }

    let first = object
        .get("resultList")
        .and_then(Value::as_array)
        .and_then(|list| list.first());

    match first {
        Some(entry) => match ProviderEntry::deserialize(entry) {
            Ok(entry) => RegistryLookup::Found(entry.into()),
            Err(e) => {
                warn!("Registry entry has unexpected shape: {}", e);
                RegistryLookup::Transient(UNKNOWN_ERROR_MESSAGE.to_string())
            }
        },
        None => RegistryLookup::Transient(UNKNOWN_ERROR_MESSAGE.to_string()),
    }
}

/// External certificate registry.
#[async_trait::async_trait]
pub trait CertificateRegistry: Send + Sync {
    async fn lookup(&self, cert_number: &str, name: &str) -> RegistryLookup;
}

/// HTTP client for the KSPO document-check endpoint.
pub struct HttpCertificateRegistry {
    client: reqwest::Client,
    url: String,
}

impl HttpCertificateRegistry {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn fetch(&self, cert_number: &str, name: &str) -> anyhow::Result<Value> {
        let form = [
            ("MENU_ID", "A05_B06"),
            ("CERTI_DIV_CD", "5"),
            ("APL_NO1", ""),
            ("APL_NO2", ""),
            ("QF_NO", cert_number),
            ("SRCH_USR_NM", name),
        ];

        let body = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .context("Registry request failed")?
            .error_for_status()
            .context("Registry returned error status")?
            .text()
            .await
            .context("Failed to read registry response")?;

        serde_json::from_str(&body).context("Registry response is not JSON")
    }
}

#[async_trait::async_trait]
impl CertificateRegistry for HttpCertificateRegistry {
    async fn lookup(&self, cert_number: &str, name: &str) -> RegistryLookup {
        match self.fetch(cert_number, name).await {
            Ok(body) => {
                info!("Registry response: {}", body);
                classify_response(&body)
            }
            Err(e) => {
                warn!("Registry lookup failed: {:#}", e);
                RegistryLookup::Transient(NO_RESPONSE_MESSAGE.to_string())
            }
        }
    }
}

/// Confirm a certificate and, when found, persist the masked image.
pub async fn verify(
    registry: &dyn CertificateRegistry,
    images: &dyn ImageStore,
    cert_number: &str,
    name: &str,
    masked: &RgbImage,
) -> VerificationResult {
    match registry.lookup(cert_number, name).await {
        RegistryLookup::Found(entry) => {
            let image_url = match store_masked(images, masked).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Masked image upload failed: {:#}", e);
                    None
                }
            };
            VerificationResult::Success { entry, image_url }
        }
        RegistryLookup::NotFound => VerificationResult::NotFound,
        RegistryLookup::Transient(message) => VerificationResult::TransientError { message },
    }
}

async fn store_masked(images: &dyn ImageStore, masked: &RgbImage) -> anyhow::Result<String> {
    let png = encode_png(masked)?;
    images.put_png(png).await
}
