//! Launcher icons for every density bucket

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

use crate::error::ScaffoldError;

/// Density buckets and their launcher icon edge length in pixels
pub const DENSITIES: [(&str, u32); 5] = [
    ("mdpi", 48),
    ("hdpi", 72),
    ("xhdpi", 96),
    ("xxhdpi", 144),
    ("xxxhdpi", 192),
];

/// One encoded launcher icon
#[derive(Debug, Clone)]
pub struct LauncherIcon {
    pub density: &'static str,
    pub size: u32,
    pub png: Vec<u8>,
}

impl LauncherIcon {
    /// Resource path relative to `res/`
    pub fn resource_path(&self) -> String {
        format!("mipmap-{}/ic_launcher.png", self.density)
    }
}

/// Icons for every density, from the uploaded image or generated from the
/// package id
pub fn launcher_icons(package_id: &str, upload: Option<&[u8]>) -> Result<Vec<LauncherIcon>, ScaffoldError> {
    let source = match upload {
        Some(bytes) => Some(
            image::load_from_memory(bytes)
                .map_err(|e| ScaffoldError::Icon(format!("cannot decode uploaded icon: {}", e)))?,
        ),
        None => None,
    };

    DENSITIES
        .iter()
        .map(|&(density, size)| {
            let img = match source {
                Some(ref src) => src.resize_to_fill(size, size, FilterType::Lanczos3).to_rgba8(),
                None => generated_icon(package_id, size),
            };
            Ok(LauncherIcon {
                density,
                size,
                png: encode_png(img)?,
            })
        })
        .collect()
}

/// Background colour derived from the package id; each channel in 40..=200
pub fn icon_color(package_id: &str) -> Rgba<u8> {
    let digest = Sha256::digest(package_id.as_bytes());
    let channel = |b: u8| 40 + (b as u32 * 160 / 255) as u8;
    Rgba([channel(digest[0]), channel(digest[1]), channel(digest[2]), 255])
}

/// Filled circle with a white window glyph
fn generated_icon(package_id: &str, size: u32) -> RgbaImage {
    let color = icon_color(package_id);
    let white = Rgba([255, 255, 255, 255]);
    let clear = Rgba([0, 0, 0, 0]);

    let center = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 2.0;
    let glyph_min = size / 4;
    let glyph_max = size - size / 4;
    let bar = glyph_min + size / 8;

    RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        if dx * dx + dy * dy > radius * radius {
            return clear;
        }
        let in_glyph = (glyph_min..glyph_max).contains(&x) && (glyph_min..glyph_max).contains(&y);
        let on_border = x == glyph_min || x + 1 == glyph_max || y == glyph_max - 1 || y < bar;
        if in_glyph && on_border {
            white
        } else {
            color
        }
    })
}

fn encode_png(img: RgbaImage) -> Result<Vec<u8>, ScaffoldError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ScaffoldError::Icon(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_densities_generated() {
        let icons = launcher_icons("com.example.demo", None).unwrap();
        let sizes: Vec<u32> = icons.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![48, 72, 96, 144, 192]);

        for icon in &icons {
            let decoded = image::load_from_memory(&icon.png).unwrap();
            assert_eq!(decoded.width(), icon.size);
            assert_eq!(decoded.height(), icon.size);
        }
        assert_eq!(icons[0].resource_path(), "mipmap-mdpi/ic_launcher.png");
    }

    #[test]
    fn test_generated_icons_are_deterministic() {
        let a = launcher_icons("com.example.demo", None).unwrap();
        let b = launcher_icons("com.example.demo", None).unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| x.png == y.png));
    }

    #[test]
    fn test_color_range_and_stability() {
        let color = icon_color("com.example.demo");
        assert_eq!(color, icon_color("com.example.demo"));
        assert!(color.0[..3].iter().all(|c| (40..=200).contains(c)));
        assert_ne!(color, icon_color("com.example.other"));
    }

    #[test]
    fn test_uploaded_icon_is_resized() {
        let upload = RgbaImage::from_pixel(300, 200, Rgba([10, 20, 30, 255]));
        let png = encode_png(upload).unwrap();

        let icons = launcher_icons("com.example.demo", Some(&png)).unwrap();
        let largest = image::load_from_memory(&icons[4].png).unwrap();
        assert_eq!((largest.width(), largest.height()), (192, 192));
    }

    #[test]
    fn test_garbage_upload_rejected() {
        let err = launcher_icons("com.example.demo", Some(b"not an image")).unwrap_err();
        assert!(matches!(err, ScaffoldError::Icon(_)));
    }
}
