use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::error::LandwatchError;

use super::detection_utils::Detection;

const LINE_COLOR: Rgba<u8> = Rgba([255, 64, 32, 255]);
const MASK_COLOR: Rgba<u8> = Rgba([255, 220, 0, 255]);
const LINE_THICKNESS: u32 = 3;

/// Decode raw bytes. Anything the decoder rejects is reported as an
/// unreadable image rather than an I/O failure.
pub fn decode_image(filename: &str, bytes: &[u8]) -> Result<DynamicImage, LandwatchError> {
    image::load_from_memory(bytes).map_err(|err| LandwatchError::unreadable(filename, err))
}

/// Draw detection boxes and mask outlines onto a copy of `image`.
pub fn draw_detections(image: &DynamicImage, detections: &[Detection]) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (img_width, img_height) = canvas.dimensions();

    for detection in detections {
        let bbox = &detection.bbox;
        let box_x = bbox.x1.max(0.0) as u32;
        let box_y = bbox.y1.max(0.0) as u32;
        let box_x2 = (bbox.x2.max(0.0) as u32).min(img_width);
        let box_y2 = (bbox.y2.max(0.0) as u32).min(img_height);
        if box_x2 <= box_x || box_y2 <= box_y {
            continue;
        }
        let box_width = box_x2 - box_x;
        let box_height = box_y2 - box_y;

        for i in 0..LINE_THICKNESS {
            if box_width <= 2 * i || box_height <= 2 * i {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at((box_x + i) as i32, (box_y + i) as i32)
                    .of_size(box_width - 2 * i, box_height - 2 * i),
                LINE_COLOR,
            );
        }

        for polygon in &detection.segmentation {
            draw_polygon_outline(&mut canvas, polygon);
        }
    }

    canvas
}

fn draw_polygon_outline(canvas: &mut RgbaImage, flat_points: &[f32]) {
    let points: Vec<(f32, f32)> = flat_points
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    if points.len() < 2 {
        return;
    }

    for (idx, start) in points.iter().enumerate() {
        let end = points[(idx + 1) % points.len()];
        draw_line_segment_mut(canvas, *start, end, MASK_COLOR);
    }
}

/// Render the annotated copy and write it as PNG. Runs on the blocking pool.
pub async fn save_annotated(
    image: DynamicImage,
    detections: Vec<Detection>,
    path: &Path,
) -> Result<(), LandwatchError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), LandwatchError> {
        let canvas = draw_detections(&image, &detections);
        canvas.save_with_format(&path, image::ImageFormat::Png)?;
        Ok(())
    })
    .await
    .map_err(|err| LandwatchError::Other(format!("Render task failed: {}", err)))?
}
