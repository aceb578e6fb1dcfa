//! Wire types for the request and response topics.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Request topics the consumer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTopic {
    BusinessLicense,
    Certificate,
}

impl RequestTopic {
    pub fn from_topic(topic: &str) -> Option<Self> {
        match topic {
            "business_license_request" => Some(Self::BusinessLicense),
            "certificate_request" => Some(Self::Certificate),
            _ => None,
        }
    }

    pub fn response_topic(&self) -> &'static str {
        match self {
            Self::BusinessLicense => "business_license_response",
            Self::Certificate => "certificate_response",
        }
    }
}

/// Body of both request topics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentRequest {
    /// Image URL.
    pub path: String,
    /// Requesting user; echoed back as the correlation id.
    #[serde(deserialize_with = "correlation_id")]
    pub id: i64,
}

/// Producers send the id either as a number or as a numeric string.
fn correlation_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A parsed inbound request, one variant per topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRequest {
    BusinessLicense(DocumentRequest),
    Certificate(DocumentRequest),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("malformed {topic} payload: {reason}")]
    Malformed { topic: String, reason: String },
}

impl InboundRequest {
    pub fn parse(topic: &str, payload: &[u8]) -> Result<Self, ParseError> {
        let kind = RequestTopic::from_topic(topic)
            .ok_or_else(|| ParseError::UnknownTopic(topic.to_string()))?;

        let request: DocumentRequest =
            serde_json::from_slice(payload).map_err(|e| ParseError::Malformed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        Ok(match kind {
            RequestTopic::BusinessLicense => Self::BusinessLicense(request),
            RequestTopic::Certificate => Self::Certificate(request),
        })
    }

    pub fn topic(&self) -> RequestTopic {
        match self {
            Self::BusinessLicense(_) => RequestTopic::BusinessLicense,
            Self::Certificate(_) => RequestTopic::Certificate,
        }
    }

    pub fn document(&self) -> &DocumentRequest {
        match self {
            Self::BusinessLicense(req) | Self::Certificate(req) => req,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessLicenseResponse {
    pub user_id: i64,
    pub gym_id: Option<i64>,
    pub message: String,
}

/// Status-tagged certificate payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CertificateOutcome {
    Success {
        cert_number: String,
        name: String,
        level: String,
        category: String,
        acquisition_date: String,
        #[serde(rename = "newPath")]
        new_path: Option<String>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cert_number: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl CertificateOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            cert_number: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateResponse {
    #[serde(flatten)]
    pub outcome: CertificateOutcome,
    pub id: i64,
    pub path: String,
}

/// Exactly one of these is published per answered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundResponse {
    BusinessLicense(BusinessLicenseResponse),
    Certificate(CertificateResponse),
}

impl OutboundResponse {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::BusinessLicense(_) => RequestTopic::BusinessLicense.response_topic(),
            Self::Certificate(_) => RequestTopic::Certificate.response_topic(),
        }
    }

    pub fn correlation_id(&self) -> i64 {
        match self {
            Self::BusinessLicense(r) => r.user_id,
            Self::Certificate(r) => r.id,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::BusinessLicense(r) => serde_json::to_value(r),
            Self::Certificate(r) => serde_json::to_value(r),
        }
    }
}
