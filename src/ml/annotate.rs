use image::{Rgb, RgbImage};

use super::labels::class_name;
use super::pipeline::{BoundingBox, Detection};

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38], [0xFF, 0x9D, 0x97], [0xFF, 0x70, 0x1F], [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31], [0x48, 0xF9, 0x0A], [0x92, 0xCC, 0x17], [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34], [0x00, 0xD4, 0xBB], [0x2C, 0x99, 0xA8], [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93], [0x64, 0x73, 0xFF], [0x00, 0x18, 0xEC], [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85], [0xCB, 0x38, 0xFF], [0xFF, 0x95, 0xC8], [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Caption drawn above a box: `None` with `hide_labels`, the bare class name
/// with `hide_conf`.
pub fn caption(detection: &Detection, names: &[String], hide_labels: bool, hide_conf: bool) -> Option<String> {
    if hide_labels {
        return None;
    }
    let name = class_name(names, detection.class_id);
    Some(if hide_conf {
        name
    } else {
        format!("{} {:.2}", name, detection.confidence)
    })
}

pub fn line_width(image: &RgbImage) -> u32 {
    (((image.width() + image.height()) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

pub fn draw_detections(
    image: &mut RgbImage,
    detections: &[Detection],
    names: &[String],
    hide_labels: bool,
    hide_conf: bool,
) {
    let thickness = line_width(image);
    for detection in detections {
        let color = class_color(detection.class_id);
        draw_box(image, &detection.bbox, thickness, color);
        if let Some(text) = caption(detection, names, hide_labels, hide_conf) {
            draw_caption(image, &detection.bbox, &text, thickness, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(image.width() as i64);
    let y1 = y1.min(image.height() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, thickness: u32, color: Rgb<u8>) {
    let t = thickness as i64;
    let (x1, y1) = (bbox.x1.round() as i64, bbox.y1.round() as i64);
    let (x2, y2) = (bbox.x2.round() as i64, bbox.y2.round() as i64);

    fill_rect(image, x1, y1, x2, y1 + t, color);
    fill_rect(image, x1, y2 - t, x2, y2, color);
    fill_rect(image, x1, y1, x1 + t, y2, color);
    fill_rect(image, x2 - t, y1, x2, y2, color);
}

fn draw_caption(image: &mut RgbImage, bbox: &BoundingBox, text: &str, thickness: u32, color: Rgb<u8>) {
    let scale = (thickness - 1).max(1) as i64;
    let advance = (GLYPH_WIDTH as i64 + 1) * scale;
    let text_width = advance * text.chars().count() as i64 + scale;
    let label_height = (GLYPH_HEIGHT as i64 + 2) * scale;

    let x = bbox.x1.round() as i64;
    // Above the box, or just inside it when there is no room.
    let top = if bbox.y1.round() as i64 >= label_height {
        bbox.y1.round() as i64 - label_height
    } else {
        bbox.y1.round() as i64
    };

    fill_rect(image, x, top, x + text_width, top + label_height, color);

    for (i, c) in text.chars().enumerate() {
        let origin_x = x + scale + advance * i as i64;
        let origin_y = top + scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b100u8 >> col) == 0 {
                    continue;
                }
                let px = origin_x + col as i64 * scale;
                let py = origin_y + row as i64 * scale;
                fill_rect(image, px, py, px + scale, py + scale, TEXT_COLOR);
            }
        }
    }
}

/// 3x5 bitmap rows, most significant of the low three bits on the left.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_lowercase() {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        'a' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'b' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'd' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'f' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'g' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'h' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'k' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'n' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'o' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'p' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'r' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' => [0b011, 0b100, 0b010, 0b001, 0b110],
        't' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'w' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'x' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        _ => [0; 5],
    }
}
