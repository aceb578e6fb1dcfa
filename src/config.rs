//! Process-wide configuration, read once from the environment at startup.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const REQUEST_TOPICS: [&str; 2] = ["business_license_request", "certificate_request"];

const DEFAULT_REGISTRY_URL: &str = "https://sqms.kspo.or.kr/license/docTrueCheckActJs.kspo";
const DEFAULT_NTS_VALIDATE_URL: &str = "https://api.odcloud.kr/api/nts-businessman/v1/validate";

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct DocumentAiConfig {
    pub project_id: String,
    pub location: String,
    pub processor_id: String,
    pub credentials_path: PathBuf,
}

impl DocumentAiConfig {
    /// Fully qualified processor resource name.
    pub fn processor_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct BusinessConfig {
    pub validate_url: String,
    pub service_key: String,
    pub gym_matcher_url: Option<String>,
}

/// Which request paths run the document scan before OCR.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub scan_certificates: bool,
    pub scan_licenses: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kafka: KafkaConfig,
    pub storage: StorageConfig,
    pub document_ai: DocumentAiConfig,
    pub registry_url: String,
    pub business: BusinessConfig,
    pub pipeline: PipelineOptions,
    pub http_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let publish_timeout_secs = match env::var("KAFKA_PUBLISH_TIMEOUT_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .with_context(|| format!("KAFKA_PUBLISH_TIMEOUT_SECS is not a number: {}", v))?,
            Err(_) => 5,
        };

        Ok(Self {
            kafka: KafkaConfig {
                bootstrap_servers: env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
                group_id: env_or("KAFKA_GROUP_ID", "ocr-consumer-group"),
                publish_timeout: Duration::from_secs(publish_timeout_secs),
            },
            storage: StorageConfig {
                bucket: required("S3_BUCKET_NAME")?,
                region: required("AWS_REGION")?,
            },
            document_ai: DocumentAiConfig {
                project_id: env_or("DOCUMENT_AI_PROJECT_ID", "opt-ocr"),
                location: env_or("DOCUMENT_AI_LOCATION", "us"),
                processor_id: required("DOCUMENT_AI_PROCESSOR_ID")?,
                credentials_path: PathBuf::from(required("GOOGLE_APPLICATION_CREDENTIALS")?),
            },
            registry_url: env_or("CERT_REGISTRY_URL", DEFAULT_REGISTRY_URL),
            business: BusinessConfig {
                validate_url: env_or("NTS_VALIDATE_URL", DEFAULT_NTS_VALIDATE_URL),
                service_key: required("NTS_SERVICE_KEY")?,
                gym_matcher_url: env::var("GYM_MATCHER_URL").ok().filter(|v| !v.is_empty()),
            },
            pipeline: PipelineOptions {
                scan_certificates: env_flag("CERTIFICATE_DOCUMENT_SCAN"),
                scan_licenses: env_flag("LICENSE_DOCUMENT_SCAN"),
            },
            http_addr: env_or("HTTP_ADDR", "0.0.0.0:3000"),
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} environment variable not set", key))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|v| parse_flag(&v)).unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
