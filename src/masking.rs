//! Redaction of the certificate number before an image is persisted.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, info};

use crate::ocr::{OcrBlock, OcrDocument};

const MARGIN_X: i32 = 10;
const MARGIN_Y: i32 = 5;

/// Paint the first "제 ... 호" block black.
///
/// Best effort: when no block carries both markers the image comes back
/// untouched.
pub fn mask_first_identifier(mut image: RgbImage, document: &OcrDocument) -> RgbImage {
    for block in document.blocks() {
        let text = document.block_text(block);
        if !(text.contains('제') && text.contains('호')) {
            continue;
        }

        match redaction_rect(block, image.width(), image.height()) {
            Some(rect) => {
                draw_filled_rect_mut(&mut image, rect, Rgb([0, 0, 0]));
                info!("Masked identifier block '{}' at {:?}", text.trim(), rect);
            }
            None => debug!("Identifier block '{}' has no usable geometry", text.trim()),
        }
        return image;
    }

    debug!("No identifier block found; image left unmasked");
    image
}

/// Bounding box of the block expanded by the margins, clipped to the image.
fn redaction_rect(block: &OcrBlock, width: u32, height: u32) -> Option<Rect> {
    if block.bounding_box.is_empty() {
        return None;
    }

    let xs = block.bounding_box.iter().map(|p| p.x as i32);
    let ys = block.bounding_box.iter().map(|p| p.y as i32);
    let x_min = (xs.clone().min()? - MARGIN_X).max(0);
    let x_max = (xs.max()? + MARGIN_X).min(width as i32 - 1);
    let y_min = (ys.clone().min()? - MARGIN_Y).max(0);
    let y_max = (ys.max()? + MARGIN_Y).min(height as i32 - 1);

    if x_max < x_min || y_max < y_min {
        return None;
    }

    Some(
        Rect::at(x_min, y_min)
            .of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32),
    )
}
