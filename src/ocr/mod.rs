//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the provider-neutral document
//! model so the pipeline never sees a vendor response shape.

pub mod document_ai;

use crate::geometry::Point;

/// A byte range into [`OcrDocument::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// A provider-defined unit of recognized text with its own geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrBlock {
    pub spans: Vec<TextSpan>,
    /// Pixel-space vertices, usually four.
    pub bounding_box: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrPage {
    pub blocks: Vec<OcrBlock>,
}

/// Full OCR output for one image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrDocument {
    pub text: String,
    pub pages: Vec<OcrPage>,
}

impl OcrDocument {
    /// Concatenate the text referenced by a block's spans.
    ///
    /// Spans that fall outside the text or off a char boundary are skipped.
    pub fn block_text(&self, block: &OcrBlock) -> String {
        block
            .spans
            .iter()
            .filter_map(|span| self.text.get(span.start..span.end))
            .collect()
    }

    /// Blocks in document order: pages first, then blocks within a page.
    pub fn blocks(&self) -> impl Iterator<Item = &OcrBlock> {
        self.pages.iter().flat_map(|page| page.blocks.iter())
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Recognize text in PNG-encoded image bytes.
    async fn process(&self, png: &[u8]) -> anyhow::Result<OcrDocument>;
}
