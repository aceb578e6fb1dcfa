//! Google Document AI OCR provider (REST `:process` endpoint).

use super::{OcrBlock, OcrDocument, OcrPage, OcrProvider, TextSpan};
use crate::config::DocumentAiConfig;
use crate::geometry::Point;
use crate::google_auth::ServiceAccountAuth;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

pub struct DocumentAiProvider {
    client: reqwest::Client,
    auth: ServiceAccountAuth,
    endpoint: String,
}

impl DocumentAiProvider {
    pub fn new(client: reqwest::Client, auth: ServiceAccountAuth, config: &DocumentAiConfig) -> Self {
        let endpoint = format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            config.location,
            config.processor_name()
        );
        Self {
            client,
            auth,
            endpoint,
        }
    }
}

// ── Document AI request/response types ──────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: DocumentAiDocument,
}

#[derive(Deserialize)]
struct DocumentAiDocument {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<DocumentAiPage>,
}

#[derive(Deserialize)]
struct DocumentAiPage {
    #[serde(default)]
    blocks: Vec<DocumentAiBlock>,
}

#[derive(Deserialize)]
struct DocumentAiBlock {
    layout: Layout,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Layout {
    #[serde(default)]
    text_anchor: TextAnchor,
    #[serde(default)]
    bounding_poly: BoundingPoly,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextAnchor {
    #[serde(default)]
    text_segments: Vec<TextSegment>,
}

/// Proto3 omits zero-valued fields and encodes int64 as a JSON string.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSegment {
    #[serde(default, deserialize_with = "int64")]
    start_index: usize,
    #[serde(default, deserialize_with = "int64")]
    end_index: usize,
}

#[derive(Default, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

#[derive(Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(usize),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Convert the provider document, turning code-point indices into byte offsets.
fn into_document(doc: DocumentAiDocument) -> OcrDocument {
    let boundaries: Vec<usize> = doc
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(doc.text.len()))
        .collect();
    let to_byte = |index: usize| boundaries.get(index).copied().unwrap_or(doc.text.len());

    let pages = doc
        .pages
        .into_iter()
        .map(|page| OcrPage {
            blocks: page
                .blocks
                .into_iter()
                .map(|block| OcrBlock {
                    spans: block
                        .layout
                        .text_anchor
                        .text_segments
                        .iter()
                        .map(|s| TextSpan {
                            start: to_byte(s.start_index),
                            end: to_byte(s.end_index),
                        })
                        .collect(),
                    bounding_box: block
                        .layout
                        .bounding_poly
                        .vertices
                        .iter()
                        .map(|v| Point::new(v.x as f32, v.y as f32))
                        .collect(),
                })
                .collect(),
        })
        .collect();

    OcrDocument {
        text: doc.text,
        pages,
    }
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for DocumentAiProvider {
    fn name(&self) -> &str {
        "document_ai"
    }

    async fn process(&self, png: &[u8]) -> anyhow::Result<OcrDocument> {
        let token = self.auth.access_token(&self.client).await?;

        let body = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(png),
                mime_type: "image/png",
            },
        };

        info!("DocumentAiProvider: processing {} bytes", png.len());

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Document AI")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Document AI error ({}): {}", status, text);
        }

        let parsed: ProcessResponse = resp
            .json()
            .await
            .context("Failed to parse Document AI response")?;
        let document = into_document(parsed.document);

        debug!(
            "DocumentAiProvider: {} chars, {} pages",
            document.text.chars().count(),
            document.pages.len()
        );
        Ok(document)
    }
}
