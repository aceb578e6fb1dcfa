//! Failure taxonomy for one request's pipeline run.

use thiserror::Error;

/// Message shown when the document boundary cannot be found.
pub const DOCUMENT_NOT_RECOGNIZED: &str =
    "문서를 인식할 수 없습니다. 문서가 전체가 보이도록 다시 촬영해주세요";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image download failed: {0}")]
    Download(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("no 4-point document contour found")]
    Detection,

    #[error("degenerate document contour: {0}")]
    DegenerateContour(String),

    #[error("OCR request failed: {0}")]
    Ocr(String),

    #[error("document class mismatch: {0}")]
    ClassMismatch(String),

    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("business validation unavailable: {0}")]
    BusinessValidation(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl PipelineError {
    /// Failures that end the request without any outbound event.
    ///
    /// The requester is never told about these; see DESIGN.md.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Download(_) | Self::Decode(_))
    }

    /// User-facing message published in the error payload.
    pub fn user_message(&self) -> String {
        match self {
            Self::Detection | Self::DegenerateContour(_) | Self::Ocr(_) => {
                DOCUMENT_NOT_RECOGNIZED.to_string()
            }
            Self::ClassMismatch(message) => message.clone(),
            Self::MissingFields(fields) => format!(
                "다음 정보가 누락되었습니다: {}. 사진을 다시 찍어주세요.",
                fields.join(", ")
            ),
            Self::BusinessValidation(_) => {
                "사업자 등록 정보를 확인할 수 없습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            Self::Download(_) | Self::Decode(_) | Self::Encode(_) | Self::Publish(_) => {
                "알 수 없는 오류가 발생했습니다.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_message() {
        let err = PipelineError::MissingFields(vec!["자격증 번호", "자격등급"]);
        assert_eq!(
            err.user_message(),
            "다음 정보가 누락되었습니다: 자격증 번호, 자격등급. 사진을 다시 찍어주세요."
        );
    }

    #[test]
    fn test_silent_failures() {
        assert!(PipelineError::Download("404".into()).is_silent());
        assert!(PipelineError::Decode("bad png".into()).is_silent());
        assert!(!PipelineError::Detection.is_silent());
        assert!(!PipelineError::ClassMismatch("x".into()).is_silent());
    }
}
