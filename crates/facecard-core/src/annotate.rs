//! Drawing face boxes and QR overlays onto result images.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Height of the filled label band drawn inside the bottom of a face box.
const LABEL_BAND: u32 = 35;

/// Fill `[x0, x1) × [y0, y1)`, clipped to the image.
fn fill(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(img.width());
    let y1 = y1.min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

/// Outline a face region with a border `thickness` pixels wide, drawn inward.
pub fn draw_region(img: &mut RgbImage, region: &FaceRegion, color: Rgb<u8>, thickness: u32) {
    let FaceRegion { top, right, bottom, left } = *region;
    let (x1, y1) = (right + 1, bottom + 1);
    let t = thickness.max(1);

    fill(img, left, top, x1, (top + t).min(y1), color);
    fill(img, left, y1.saturating_sub(t).max(top), x1, y1, color);
    fill(img, left, top, (left + t).min(x1), y1, color);
    fill(img, x1.saturating_sub(t).max(left), top, x1, y1, color);
}

/// Solid band along the bottom edge of a face box, where a name label sits.
pub fn draw_label_band(img: &mut RgbImage, region: &FaceRegion, color: Rgb<u8>) {
    let top = region.bottom.saturating_sub(LABEL_BAND).max(region.top);
    fill(img, region.left, top, region.right + 1, region.bottom + 1, color);
}

/// Resize a QR image to `size`×`size` and paste it at `(x, y)`.
pub fn overlay_qr(img: &mut RgbImage, qr: &GrayImage, size: u32, x: i64, y: i64) {
    let small = imageops::resize(qr, size, size, FilterType::Nearest);
    let rgb = RgbImage::from_fn(size, size, |px, py| {
        let v = small.get_pixel(px, py)[0];
        Rgb([v, v, v])
    });
    imageops::replace(img, &rgb, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_draw_region_outline_only() {
        let mut img = RgbImage::new(20, 20);
        let region = FaceRegion { top: 2, right: 12, bottom: 14, left: 4 };
        draw_region(&mut img, &region, GREEN, 2);

        assert_eq!(*img.get_pixel(4, 2), GREEN);
        assert_eq!(*img.get_pixel(12, 14), GREEN);
        assert_eq!(*img.get_pixel(5, 8), GREEN);
        assert_eq!(*img.get_pixel(8, 8), Rgb([0, 0, 0]), "interior stays untouched");
        assert_eq!(*img.get_pixel(13, 8), Rgb([0, 0, 0]), "outside stays untouched");
    }

    #[test]
    fn test_draw_region_clips_to_image() {
        let mut img = RgbImage::new(10, 10);
        let region = FaceRegion { top: 5, right: 30, bottom: 30, left: 5 };
        draw_region(&mut img, &region, RED, 3);
        assert_eq!(*img.get_pixel(9, 5), RED);
    }

    #[test]
    fn test_label_band() {
        let mut img = RgbImage::new(100, 100);
        let region = FaceRegion { top: 10, right: 60, bottom: 80, left: 20 };
        draw_label_band(&mut img, &region, RED);
        assert_eq!(*img.get_pixel(30, 50), RED);
        assert_eq!(*img.get_pixel(30, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_overlay_qr_position() {
        let mut img = RgbImage::from_pixel(300, 300, Rgb([7, 7, 7]));
        let qr = GrayImage::from_pixel(290, 290, Luma([255]));
        overlay_qr(&mut img, &qr, 150, 10, 10);
        assert_eq!(*img.get_pixel(10, 10), Rgb([255, 255, 255]));
        assert_eq!(*img.get_pixel(159, 159), Rgb([255, 255, 255]));
        assert_eq!(*img.get_pixel(160, 160), Rgb([7, 7, 7]));
        assert_eq!(*img.get_pixel(5, 5), Rgb([7, 7, 7]));
    }
}
