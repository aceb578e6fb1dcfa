//! Request routing and the per-topic handlers.
//!
//! Every inbound message ends in a typed [`MessageOutcome`]: either one
//! correlated response was published, or the message was dropped for a
//! logged reason. Nothing raised by a handler escapes the message boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::business::{BusinessStatus, BusinessValidator, GymMatcher};
use crate::bus::EventPublisher;
use crate::config::PipelineOptions;
use crate::error::PipelineError;
use crate::extractor::{CertificateRecord, FieldExtractor};
use crate::geometry::scan_document;
use crate::masking::mask_first_identifier;
use crate::messages::{
    BusinessLicenseResponse, CertificateOutcome, CertificateResponse, DocumentRequest,
    InboundRequest, OutboundResponse, ParseError,
};
use crate::ocr::{OcrDocument, OcrProvider};
use crate::registry::{self, CertificateRegistry, VerificationResult, NOT_FOUND_MESSAGE};
use crate::storage::{decode_image, encode_png, ImageStore};

/// External collaborators, constructed once at startup.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageStore>,
    pub ocr: Arc<dyn OcrProvider>,
    pub registry: Arc<dyn CertificateRegistry>,
    pub business: Arc<dyn BusinessValidator>,
    pub gyms: Arc<dyn GymMatcher>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Why a message produced no response.
#[derive(Debug)]
pub enum DropReason {
    UnknownTopic(String),
    Malformed(String),
    /// The handler stopped before it could answer.
    NoResponse {
        correlation_id: i64,
        error: PipelineError,
    },
    PublishFailed {
        topic: &'static str,
        correlation_id: i64,
        error: PipelineError,
    },
}

#[derive(Debug)]
pub enum MessageOutcome {
    Responded {
        topic: &'static str,
        correlation_id: i64,
    },
    Dropped(DropReason),
}

impl MessageOutcome {
    pub fn log(&self) {
        match self {
            Self::Responded {
                topic,
                correlation_id,
            } => info!("Responded on {} for id {}", topic, correlation_id),
            Self::Dropped(DropReason::UnknownTopic(topic)) => {
                warn!("Dropped message from unknown topic {}", topic)
            }
            Self::Dropped(DropReason::Malformed(reason)) => {
                error!("Dropped malformed message: {}", reason)
            }
            Self::Dropped(DropReason::NoResponse {
                correlation_id,
                error,
            }) => error!("No response sent for id {}: {}", correlation_id, error),
            Self::Dropped(DropReason::PublishFailed {
                topic,
                correlation_id,
                error,
            }) => error!(
                "Response on {} for id {} was not delivered: {}",
                topic, correlation_id, error
            ),
        }
    }
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    responded: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub responded: u64,
    pub dropped: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &MessageOutcome) {
        let counter = match outcome {
            MessageOutcome::Responded { .. } => &self.responded,
            MessageOutcome::Dropped(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Dispatcher {
    services: Services,
    extractor: FieldExtractor,
    options: PipelineOptions,
    stats: Arc<ConsumerStats>,
}

impl Dispatcher {
    pub fn new(
        services: Services,
        extractor: FieldExtractor,
        options: PipelineOptions,
        stats: Arc<ConsumerStats>,
    ) -> Self {
        Self {
            services,
            extractor,
            options,
            stats,
        }
    }

    /// Run one message through parse, route, handle, and respond.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> MessageOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        info!(
            "Received message from {}: {}",
            topic,
            String::from_utf8_lossy(payload)
        );

        let outcome = match InboundRequest::parse(topic, payload) {
            Ok(request) => self.route(request).await,
            Err(ParseError::UnknownTopic(topic)) => {
                MessageOutcome::Dropped(DropReason::UnknownTopic(topic))
            }
            Err(e @ ParseError::Malformed { .. }) => {
                MessageOutcome::Dropped(DropReason::Malformed(e.to_string()))
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    async fn route(&self, request: InboundRequest) -> MessageOutcome {
        info!(
            "Routing id {} to the {:?} handler",
            request.document().id,
            request.topic()
        );
        let handled = match &request {
            InboundRequest::BusinessLicense(req) => self.handle_business_license(req).await,
            InboundRequest::Certificate(req) => self.handle_certificate(req).await,
        };

        match handled {
            Ok(response) => self.respond(response).await,
            Err(reason) => MessageOutcome::Dropped(reason),
        }
    }

    async fn respond(&self, response: OutboundResponse) -> MessageOutcome {
        let topic = response.topic();
        let correlation_id = response.correlation_id();

        let sent = match response.to_json() {
            Ok(payload) => self.services.publisher.publish(topic, &payload).await,
            Err(e) => Err(PipelineError::Publish(e.to_string())),
        };

        match sent {
            Ok(()) => MessageOutcome::Responded {
                topic,
                correlation_id,
            },
            Err(error) => MessageOutcome::Dropped(DropReason::PublishFailed {
                topic,
                correlation_id,
                error,
            }),
        }
    }

    async fn handle_certificate(
        &self,
        req: &DocumentRequest,
    ) -> Result<OutboundResponse, DropReason> {
        let outcome = match self.certificate_pipeline(req).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_silent() => {
                return Err(DropReason::NoResponse {
                    correlation_id: req.id,
                    error: e,
                })
            }
            Err(e) => {
                warn!("Certificate request {} failed: {}", req.id, e);
                CertificateOutcome::error(e.user_message())
            }
        };

        Ok(OutboundResponse::Certificate(CertificateResponse {
            outcome,
            id: req.id,
            path: req.path.clone(),
        }))
    }

    async fn certificate_pipeline(
        &self,
        req: &DocumentRequest,
    ) -> Result<CertificateOutcome, PipelineError> {
        let image = self.load_image(req).await?;
        let image = if self.options.scan_certificates {
            scan_document(&image)?
        } else {
            image
        };

        let document = self.recognize(&image).await?;
        let record = self.extractor.extract_certificate(&document.text)?;
        let masked = mask_first_identifier(image, &document);

        let result = registry::verify(
            self.services.registry.as_ref(),
            self.services.images.as_ref(),
            &record.cert_number,
            &record.name,
            &masked,
        )
        .await;
        info!("Verification result for id {}: {:?}", req.id, result);

        Ok(certificate_outcome(result, &record))
    }

    async fn handle_business_license(
        &self,
        req: &DocumentRequest,
    ) -> Result<OutboundResponse, DropReason> {
        let (gym_id, message) = match self.license_pipeline(req).await {
            Ok(answer) => answer,
            Err(e) if e.is_silent() => {
                return Err(DropReason::NoResponse {
                    correlation_id: req.id,
                    error: e,
                })
            }
            Err(e) => {
                warn!("Business license request {} failed: {}", req.id, e);
                (None, e.user_message())
            }
        };

        Ok(OutboundResponse::BusinessLicense(BusinessLicenseResponse {
            user_id: req.id,
            gym_id,
            message,
        }))
    }

    async fn license_pipeline(
        &self,
        req: &DocumentRequest,
    ) -> Result<(Option<i64>, String), PipelineError> {
        let image = self.load_image(req).await?;
        let image = if self.options.scan_licenses {
            match scan_document(&image) {
                Ok(scanned) => scanned,
                Err(e) => {
                    warn!("Document scan failed ({}); using the raw image", e);
                    image
                }
            }
        } else {
            image
        };

        let document = self.recognize(&image).await?;
        let record = self.extractor.extract_business_license(&document.text)?;

        let status = self
            .services
            .business
            .validate(&record)
            .await
            .map_err(|e| PipelineError::BusinessValidation(format!("{:#}", e)))?;

        let gym_id = if status == BusinessStatus::Active {
            match self.services.gyms.find_most_similar_gym(&record).await {
                Ok(gym) => gym.map(|g| g.gym_id),
                Err(e) => {
                    warn!("Gym matching failed: {:#}", e);
                    None
                }
            }
        } else {
            None
        };
        info!("Business license id {}: {:?}, gym {:?}", req.id, status, gym_id);

        Ok((gym_id, status.message().to_string()))
    }

    async fn load_image(&self, req: &DocumentRequest) -> Result<RgbImage, PipelineError> {
        info!("Fetching image for id {}: {}", req.id, req.path);
        let bytes = self.services.images.fetch(&req.path).await?;
        decode_image(&bytes)
    }

    async fn recognize(&self, image: &RgbImage) -> Result<OcrDocument, PipelineError> {
        let png = encode_png(image)?;
        let document = self
            .services
            .ocr
            .process(&png)
            .await
            .map_err(|e| PipelineError::Ocr(format!("{}: {:#}", self.services.ocr.name(), e)))?;
        info!("OCR text:\n{}", document.text);
        Ok(document)
    }
}

fn certificate_outcome(result: VerificationResult, record: &CertificateRecord) -> CertificateOutcome {
    match result {
        VerificationResult::Success { entry, image_url } => CertificateOutcome::Success {
            cert_number: entry.cert_number,
            name: entry.name,
            level: entry.level,
            category: entry.category,
            acquisition_date: entry.acquisition_date,
            new_path: image_url,
        },
        VerificationResult::NotFound => CertificateOutcome::Error {
            message: NOT_FOUND_MESSAGE.to_string(),
            cert_number: Some(record.cert_number.clone()),
            name: Some(record.name.clone()),
        },
        VerificationResult::TransientError { message } => CertificateOutcome::error(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business::GymMatch;
    use crate::error::DOCUMENT_NOT_RECOGNIZED;
    use crate::extractor::BusinessLicenseRecord;
    use crate::geometry::Point;
    use crate::ocr::{OcrBlock, OcrPage, TextSpan};
    use crate::registry::{RegistryEntry, RegistryLookup, NO_RESPONSE_MESSAGE};
    use image::Rgb;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const CERTIFICATE_TEXT: &str =
        "생활스포츠지도사\n제 12-345 호\n성명 홍길동\n자격등급 2급\n자격종목 수영\n";
    const LICENSE_TEXT: &str = "사업자등록증\n등록번호 : 123-45-67890\n상호 : 오피티 짐\n대표자 : 홍길동\n개업연월일 : 2020 년 03 월 07 일\n";
    const STORED_URL: &str = "https://opt-bucket.s3.ap-northeast-2.amazonaws.com/masked.png";

    struct FakeImages {
        png: Option<Vec<u8>>,
        stored: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl ImageStore for FakeImages {
        async fn fetch(&self, _uri: &str) -> Result<Vec<u8>, PipelineError> {
            self.png
                .clone()
                .ok_or_else(|| PipelineError::Download("Failed to download image: 404".into()))
        }

        async fn put_png(&self, png: Vec<u8>) -> anyhow::Result<String> {
            self.stored.lock().unwrap().push(png);
            Ok(STORED_URL.to_string())
        }
    }

    struct FakeOcr {
        document: OcrDocument,
    }

    #[async_trait::async_trait]
    impl OcrProvider for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        async fn process(&self, _png: &[u8]) -> anyhow::Result<OcrDocument> {
            Ok(self.document.clone())
        }
    }

    struct FakeRegistry {
        reply: RegistryLookup,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl CertificateRegistry for FakeRegistry {
        async fn lookup(&self, cert_number: &str, name: &str) -> RegistryLookup {
            self.calls
                .lock()
                .unwrap()
                .push((cert_number.to_string(), name.to_string()));
            self.reply.clone()
        }
    }

    struct FakeValidator {
        status: BusinessStatus,
    }

    #[async_trait::async_trait]
    impl BusinessValidator for FakeValidator {
        async fn validate(&self, _record: &BusinessLicenseRecord) -> anyhow::Result<BusinessStatus> {
            Ok(self.status.clone())
        }
    }

    struct FakeGyms {
        gym_id: Option<i64>,
    }

    #[async_trait::async_trait]
    impl GymMatcher for FakeGyms {
        async fn find_most_similar_gym(
            &self,
            _record: &BusinessLicenseRecord,
        ) -> anyhow::Result<Option<GymMatch>> {
            Ok(self.gym_id.map(|gym_id| GymMatch { gym_id }))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<(String, Value)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PipelineError> {
            if self.fail {
                return Err(PipelineError::Publish("broker unavailable".into()));
            }
            self.events
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.clone()));
            Ok(())
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        images: Arc<FakeImages>,
        registry: Arc<FakeRegistry>,
        publisher: Arc<RecordingPublisher>,
        stats: Arc<ConsumerStats>,
    }

    impl Harness {
        fn events(&self) -> Vec<(String, Value)> {
            self.publisher.events.lock().unwrap().clone()
        }
    }

    fn certificate_document() -> OcrDocument {
        // "생활스포츠지도사\n" is 25 bytes; "제 12-345 호" follows at 25..39
        OcrDocument {
            text: CERTIFICATE_TEXT.to_string(),
            pages: vec![OcrPage {
                blocks: vec![OcrBlock {
                    spans: vec![TextSpan { start: 25, end: 39 }],
                    bounding_box: vec![
                        Point::new(30.0, 20.0),
                        Point::new(70.0, 20.0),
                        Point::new(70.0, 30.0),
                        Point::new(30.0, 30.0),
                    ],
                }],
            }],
        }
    }

    fn text_document(text: &str) -> OcrDocument {
        OcrDocument {
            text: text.to_string(),
            pages: vec![],
        }
    }

    fn white_png() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(120, 80, Rgb([255, 255, 255]))).unwrap()
    }

    fn found_entry() -> RegistryLookup {
        RegistryLookup::Found(RegistryEntry {
            cert_number: "12-345".to_string(),
            name: "홍길동".to_string(),
            level: "2급".to_string(),
            category: "수영".to_string(),
            acquisition_date: "2021.12.30".to_string(),
        })
    }

    struct Setup {
        png: Option<Vec<u8>>,
        document: OcrDocument,
        reply: RegistryLookup,
        status: BusinessStatus,
        gym_id: Option<i64>,
        publish_fails: bool,
        options: PipelineOptions,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                png: Some(white_png()),
                document: certificate_document(),
                reply: found_entry(),
                status: BusinessStatus::Active,
                gym_id: Some(7),
                publish_fails: false,
                options: PipelineOptions::default(),
            }
        }
    }

    fn harness(setup: Setup) -> Harness {
        let images = Arc::new(FakeImages {
            png: setup.png,
            stored: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(FakeRegistry {
            reply: setup.reply,
            calls: Mutex::new(Vec::new()),
        });
        let publisher = Arc::new(RecordingPublisher {
            events: Mutex::new(Vec::new()),
            fail: setup.publish_fails,
        });
        let stats = Arc::new(ConsumerStats::default());

        let services = Services {
            images: images.clone(),
            ocr: Arc::new(FakeOcr {
                document: setup.document,
            }),
            registry: registry.clone(),
            business: Arc::new(FakeValidator {
                status: setup.status,
            }),
            gyms: Arc::new(FakeGyms {
                gym_id: setup.gym_id,
            }),
            publisher: publisher.clone(),
        };

        Harness {
            dispatcher: Dispatcher::new(
                services,
                FieldExtractor::new().unwrap(),
                setup.options,
                stats.clone(),
            ),
            images,
            registry,
            publisher,
            stats,
        }
    }

    const CERT_REQUEST: &[u8] = br#"{"path": "https://bucket/cert.png", "id": 42}"#;
    const LICENSE_REQUEST: &[u8] = br#"{"path": "https://bucket/license.png", "id": 5}"#;

    #[tokio::test]
    async fn test_certificate_success_end_to_end() {
        let h = harness(Setup::default());
        let outcome = h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Responded { topic: "certificate_response", correlation_id: 42 }
        ));
        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "certificate_response");
        assert_eq!(
            events[0].1,
            json!({
                "status": "success",
                "cert_number": "12-345",
                "name": "홍길동",
                "level": "2급",
                "category": "수영",
                "acquisition_date": "2021.12.30",
                "newPath": STORED_URL,
                "id": 42,
                "path": "https://bucket/cert.png"
            })
        );
        assert_eq!(
            h.registry.calls.lock().unwrap().as_slice(),
            &[("12-345".to_string(), "홍길동".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stored_image_is_masked() {
        let h = harness(Setup::default());
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let stored = h.images.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        let image = decode_image(&stored[0]).unwrap();
        assert_eq!(image.get_pixel(50, 25), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(100, 70), &Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn test_certificate_not_found_echoes_fields() {
        let h = harness(Setup {
            reply: RegistryLookup::NotFound,
            ..Setup::default()
        });
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].1,
            json!({
                "status": "error",
                "message": "해당 데이터가 없습니다.",
                "cert_number": "12-345",
                "name": "홍길동",
                "id": 42,
                "path": "https://bucket/cert.png"
            })
        );
        assert!(h.images.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_unreachable() {
        let h = harness(Setup {
            reply: RegistryLookup::Transient(NO_RESPONSE_MESSAGE.to_string()),
            ..Setup::default()
        });
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let events = h.events();
        assert_eq!(events[0].1["status"], "error");
        assert_eq!(events[0].1["message"], NO_RESPONSE_MESSAGE);
        assert!(events[0].1.get("cert_number").is_none());
    }

    #[tokio::test]
    async fn test_class_mismatch_publishes_error() {
        let h = harness(Setup {
            document: text_document("운전면허증\n성명 홍길동"),
            ..Setup::default()
        });
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1["status"], "error");
        assert_eq!(events[0].1["message"], "생활스포츠지도사 자격증만 가능합니다.");
        assert_eq!(events[0].1["id"], 42);
        assert!(h.registry.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_publishes_error() {
        let h = harness(Setup {
            document: text_document("생활스포츠지도사\n성명 홍길동\n자격종목 수영"),
            ..Setup::default()
        });
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let events = h.events();
        assert_eq!(
            events[0].1["message"],
            "다음 정보가 누락되었습니다: 자격증 번호, 자격등급. 사진을 다시 찍어주세요."
        );
    }

    #[tokio::test]
    async fn test_download_failure_sends_nothing() {
        let h = harness(Setup {
            png: None,
            ..Setup::default()
        });
        let outcome = h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Dropped(DropReason::NoResponse {
                correlation_id: 42,
                error: PipelineError::Download(_)
            })
        ));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_image_sends_nothing() {
        let h = harness(Setup {
            png: Some(b"definitely not a png".to_vec()),
            ..Setup::default()
        });
        let outcome = h.dispatcher.dispatch("business_license_request", LICENSE_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Dropped(DropReason::NoResponse {
                error: PipelineError::Decode(_),
                ..
            })
        ));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_topic_is_dropped() {
        let h = harness(Setup::default());
        let outcome = h.dispatcher.dispatch("gym_request", CERT_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Dropped(DropReason::UnknownTopic(ref t)) if t == "gym_request"
        ));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let h = harness(Setup::default());
        let outcome = h.dispatcher.dispatch("certificate_request", b"{\"path\": 1").await;

        assert!(matches!(outcome, MessageOutcome::Dropped(DropReason::Malformed(_))));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_scan_enabled_without_document_outline() {
        let h = harness(Setup {
            options: PipelineOptions {
                scan_certificates: true,
                scan_licenses: false,
            },
            ..Setup::default()
        });
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1["message"], DOCUMENT_NOT_RECOGNIZED);
        assert!(h.registry.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_business_license_active_with_gym() {
        let h = harness(Setup {
            document: text_document(LICENSE_TEXT),
            ..Setup::default()
        });
        let outcome = h.dispatcher.dispatch("business_license_request", LICENSE_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Responded { topic: "business_license_response", correlation_id: 5 }
        ));
        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].1,
            json!({"user_id": 5, "gym_id": 7, "message": "트레이너 등록에 성공했습니다"})
        );
    }

    #[tokio::test]
    async fn test_business_license_closed() {
        let h = harness(Setup {
            document: text_document(LICENSE_TEXT),
            status: BusinessStatus::Closed,
            ..Setup::default()
        });
        h.dispatcher.dispatch("business_license_request", LICENSE_REQUEST).await;

        assert_eq!(
            h.events()[0].1,
            json!({"user_id": 5, "gym_id": null, "message": "폐업한 사업자 입니다"})
        );
    }

    #[tokio::test]
    async fn test_business_license_scan_falls_back_to_raw_image() {
        let h = harness(Setup {
            document: text_document(LICENSE_TEXT),
            options: PipelineOptions {
                scan_certificates: false,
                scan_licenses: true,
            },
            ..Setup::default()
        });
        h.dispatcher.dispatch("business_license_request", LICENSE_REQUEST).await;

        assert_eq!(h.events()[0].1["message"], "트레이너 등록에 성공했습니다");
    }

    #[tokio::test]
    async fn test_business_license_unreadable() {
        let h = harness(Setup {
            document: text_document("사업자등록증\n대표자 홍길동"),
            ..Setup::default()
        });
        h.dispatcher.dispatch("business_license_request", LICENSE_REQUEST).await;

        assert_eq!(
            h.events()[0].1,
            json!({
                "user_id": 5,
                "gym_id": null,
                "message": "다음 정보가 누락되었습니다: 사업자등록번호, 개업연월일. 사진을 다시 찍어주세요."
            })
        );
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_escape() {
        let h = harness(Setup {
            publish_fails: true,
            ..Setup::default()
        });
        let outcome = h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Dropped(DropReason::PublishFailed { correlation_id: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_stats_follow_outcomes() {
        let h = harness(Setup::default());
        h.dispatcher.dispatch("certificate_request", CERT_REQUEST).await;
        h.dispatcher.dispatch("unknown_topic", CERT_REQUEST).await;
        h.dispatcher.dispatch("certificate_request", b"[]").await;

        assert_eq!(
            h.stats.snapshot(),
            StatsSnapshot {
                received: 3,
                responded: 1,
                dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_messages_handled_in_sequence() {
        let h = harness(Setup::default());
        for id in [1, 2, 3] {
            let payload = format!(r#"{{"path": "https://bucket/{id}.png", "id": {id}}}"#);
            h.dispatcher
                .dispatch("certificate_request", payload.as_bytes())
                .await;
        }

        let ids: Vec<Value> = h.events().into_iter().map(|(_, v)| v["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }
}
