//! Field extraction from raw OCR text.
//!
//! Each document class has a fixed grammar: a keyword gate naming the
//! document type, then a single line-wise pass where every field is filled
//! at most once. Pure functions, no async, no state carried across calls.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::PipelineError;

/// A fully extracted sport-instructor certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub cert_number: String,
    pub name: String,
    pub level: String,
    pub category: String,
}

/// A fully extracted business license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessLicenseRecord {
    /// Ten digits, separators removed.
    pub registration_number: String,
    pub representative: String,
    /// `YYYYMMDD`.
    pub opening_date: String,
    pub trade_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The text does not name the expected document type.
    #[error("{0}")]
    ClassMismatch(String),
    /// Required fields never matched, by display name in grammar order.
    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::ClassMismatch(message) => PipelineError::ClassMismatch(message),
            ExtractionError::MissingFields(fields) => PipelineError::MissingFields(fields),
        }
    }
}

const CERTIFICATE_MISMATCH: &str = "생활스포츠지도사 자격증만 가능합니다.";
const LICENSE_MISMATCH: &str = "사업자등록증만 가능합니다.";

/// Fill an empty slot; an already-filled slot keeps its first value.
fn fill_once(slot: &mut Option<String>, value: impl FnOnce() -> Option<String>) {
    if slot.is_none() {
        *slot = value();
    }
}

fn capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Default)]
struct CertificateBuilder {
    cert_number: Option<String>,
    name: Option<String>,
    level: Option<String>,
    category: Option<String>,
}

impl CertificateBuilder {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            (self.cert_number.is_none(), "자격증 번호"),
            (self.name.is_none(), "이름"),
            (self.level.is_none(), "자격등급"),
            (self.category.is_none(), "자격종목"),
        ]
        .into_iter()
        .filter_map(|(missing, label)| missing.then_some(label))
        .collect()
    }

    fn finish(self) -> Result<CertificateRecord, ExtractionError> {
        let missing = self.missing_fields();
        match (self.cert_number, self.name, self.level, self.category) {
            (Some(cert_number), Some(name), Some(level), Some(category)) => Ok(CertificateRecord {
                cert_number,
                name,
                level,
                category,
            }),
            _ => Err(ExtractionError::MissingFields(missing)),
        }
    }
}

#[derive(Debug, Default)]
struct BusinessLicenseBuilder {
    registration_number: Option<String>,
    representative: Option<String>,
    opening_date: Option<String>,
    trade_name: Option<String>,
    address: Option<String>,
}

impl BusinessLicenseBuilder {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            (self.registration_number.is_none(), "사업자등록번호"),
            (self.representative.is_none(), "대표자"),
            (self.opening_date.is_none(), "개업연월일"),
        ]
        .into_iter()
        .filter_map(|(missing, label)| missing.then_some(label))
        .collect()
    }

    fn finish(self) -> Result<BusinessLicenseRecord, ExtractionError> {
        let missing = self.missing_fields();
        match (self.registration_number, self.representative, self.opening_date) {
            (Some(registration_number), Some(representative), Some(opening_date)) => {
                Ok(BusinessLicenseRecord {
                    registration_number,
                    representative,
                    opening_date,
                    trade_name: self.trade_name,
                    address: self.address,
                })
            }
            _ => Err(ExtractionError::MissingFields(missing)),
        }
    }
}

/// Pre-compiled grammars for both document classes.
pub struct FieldExtractor {
    certificate_gate: Regex,
    cert_number: Regex,
    name: Regex,
    level: Regex,
    category: Regex,
    license_gate: Regex,
    registration_number: Regex,
    representative: Regex,
    opening_date: Regex,
    trade_name: Regex,
    address: Regex,
}

impl FieldExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            certificate_gate: Regex::new(r"\b(?:생활스포츠지도사|스포츠지도사|생활 스포츠)\b")?,
            cert_number: Regex::new(r"제\s*([\d\-]+)\s*호")?,
            name: Regex::new(r"성\s*명\s*[:\s]*([가-힣]{2,4})")?,
            level: Regex::new(r"자격등급[:\s]*(\d+급)")?,
            category: Regex::new(r"자격종목[:\s]*([가-힣]+)")?,
            license_gate: Regex::new(r"\b사업자\s*등록증\b")?,
            registration_number: Regex::new(r"(\d{3})\s*-\s*(\d{2})\s*-\s*(\d{5})")?,
            representative: Regex::new(r"(?:대\s*표\s*자|성\s*명)\s*[:：\s]*([가-힣]{2,4})")?,
            opening_date: Regex::new(
                r"개\s*업\s*연\s*월\s*일\s*[:：\s]*(\d{4})\s*년\s*(\d{1,2})\s*월\s*(\d{1,2})\s*일",
            )?,
            trade_name: Regex::new(r"(?:상\s*호|법\s*인\s*명)(?:\s*\(단체명\))?\s*[:：]\s*(.+)")?,
            address: Regex::new(r"사업장\s*소재지\s*[:：]?\s*(.+)")?,
        })
    }

    pub fn extract_certificate(&self, text: &str) -> Result<CertificateRecord, ExtractionError> {
        if !self.certificate_gate.is_match(text) {
            info!("Text does not name a sport-instructor certificate");
            return Err(ExtractionError::ClassMismatch(
                CERTIFICATE_MISMATCH.to_string(),
            ));
        }

        let mut builder = CertificateBuilder::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("Scanning line: '{}'", line);
            fill_once(&mut builder.cert_number, || capture(&self.cert_number, line));
            fill_once(&mut builder.name, || capture(&self.name, line));
            fill_once(&mut builder.level, || capture(&self.level, line));
            fill_once(&mut builder.category, || capture(&self.category, line));
        }

        let result = builder.finish();
        match &result {
            Ok(record) => info!("Certificate fields extracted: {:?}", record),
            Err(e) => info!("Certificate extraction incomplete: {}", e),
        }
        result
    }

    pub fn extract_business_license(
        &self,
        text: &str,
    ) -> Result<BusinessLicenseRecord, ExtractionError> {
        if !self.license_gate.is_match(text) {
            info!("Text does not name a business license");
            return Err(ExtractionError::ClassMismatch(LICENSE_MISMATCH.to_string()));
        }

        let mut builder = BusinessLicenseBuilder::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("Scanning line: '{}'", line);
            fill_once(&mut builder.registration_number, || {
                self.registration_number
                    .captures(line)
                    .map(|c| format!("{}{}{}", &c[1], &c[2], &c[3]))
            });
            fill_once(&mut builder.representative, || {
                capture(&self.representative, line)
            });
            fill_once(&mut builder.opening_date, || {
                self.opening_date
                    .captures(line)
                    .map(|c| format!("{}{:0>2}{:0>2}", &c[1], &c[2], &c[3]))
            });
            fill_once(&mut builder.trade_name, || capture(&self.trade_name, line));
            fill_once(&mut builder.address, || capture(&self.address, line));
        }

        let result = builder.finish();
        match &result {
            Ok(record) => info!("Business license fields extracted: {:?}", record),
            Err(e) => info!("Business license extraction incomplete: {}", e),
        }
        result
    }
}
