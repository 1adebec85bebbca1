//! Prepared-sprite cache.
//!
//! Clip content is resolved to premultiplied sprites exactly once per cache
//! key: image files decode through `image`, text and shape content rasterize
//! through generated SVG documents via `usvg`/`resvg`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{
    error::{KinettaError, KinettaResult},
    raster::{Sprite, premultiply_rgba8_in_place},
    value::Rgba8,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ShapeSpec {
    Rect {
        width: f64,
        height: f64,
        corner_radius: f64,
    },
    Ellipse {
        rx: f64,
        ry: f64,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextSpec {
    pub content: String,
    pub size_px: f64,
    pub color: Rgba8,
    pub font_family: String,
}

#[derive(Debug, Default)]
pub struct AssetStore {
    root: PathBuf,
    sprites: HashMap<String, Sprite>,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sprites: HashMap::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sprites.contains_key(key)
    }

    /// Registers an already-prepared sprite (decoded video frames, test
    /// fixtures). Replaces any previous entry for the key.
    pub fn insert(&mut self, key: impl Into<String>, sprite: Sprite) {
        self.sprites.insert(key.into(), sprite);
    }

    /// Decodes an image file and caches the premultiplied sprite under its
    /// source path.
    pub fn image(&mut self, source: &str) -> KinettaResult<Sprite> {
        if let Some(sprite) = self.sprites.get(source) {
            return Ok(sprite.clone());
        }
        let path = self.resolve(source);
        let bytes = std::fs::read(&path).map_err(|e| {
            KinettaError::evaluation(format!("failed to read image '{}': {e}", path.display()))
        })?;
        let sprite = decode_image(&bytes)?;
        self.sprites.insert(source.to_string(), sprite.clone());
        Ok(sprite)
    }

    pub fn image_from_bytes(&mut self, key: &str, bytes: &[u8]) -> KinettaResult<Sprite> {
        if let Some(sprite) = self.sprites.get(key) {
            return Ok(sprite.clone());
        }
        let sprite = decode_image(bytes)?;
        self.sprites.insert(key.to_string(), sprite.clone());
        Ok(sprite)
    }

    pub fn text(&mut self, key: &str, spec: &TextSpec) -> KinettaResult<Sprite> {
        if let Some(sprite) = self.sprites.get(key) {
            return Ok(sprite.clone());
        }
        let sprite = rasterize_svg(&text_svg(spec))?;
        self.sprites.insert(key.to_string(), sprite.clone());
        Ok(sprite)
    }

    pub fn shape(&mut self, key: &str, spec: &ShapeSpec, color: Rgba8) -> KinettaResult<Sprite> {
        if let Some(sprite) = self.sprites.get(key) {
            return Ok(sprite.clone());
        }
        let sprite = rasterize_svg(&shape_svg(spec, color))?;
        self.sprites.insert(key.to_string(), sprite.clone());
        Ok(sprite)
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let p = Path::new(source);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> KinettaResult<Sprite> {
    use anyhow::Context as _;

    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut data = rgba.into_raw();
    premultiply_rgba8_in_place(&mut data);
    Sprite::from_premul(width, height, data)
}

fn rasterize_svg(svg: &str) -> KinettaResult<Sprite> {
    use anyhow::Context as _;

    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(svg.as_bytes(), &opts).context("parse generated svg")?;

    let size = tree.size();
    let width = (size.width().ceil() as u32).max(1);
    let height = (size.height().ceil() as u32).max(1);

    const MAX_DIM: u32 = 16_384;
    if width > MAX_DIM || height > MAX_DIM {
        return Err(KinettaError::render(format!(
            "sprite raster size too large: {width}x{height} (max {MAX_DIM}x{MAX_DIM})"
        )));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| KinettaError::render("failed to allocate sprite pixmap"))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::identity(),
        &mut pixmap.as_mut(),
    );

    Sprite::from_premul(width, height, pixmap.data().to_vec())
}

fn shape_svg(spec: &ShapeSpec, color: Rgba8) -> String {
    match spec {
        ShapeSpec::Rect {
            width,
            height,
            corner_radius,
        } => {
            let (w, h) = (width.max(1.0), height.max(1.0));
            format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><rect width="{w}" height="{h}" rx="{rx}" fill="{fill}"/></svg>"#,
                rx = corner_radius.max(0.0),
                fill = color.css_hex(),
            )
        }
        ShapeSpec::Ellipse { rx, ry } => {
            let (rx, ry) = (rx.max(0.5), ry.max(0.5));
            let (w, h) = (rx * 2.0, ry * 2.0);
            format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><ellipse cx="{rx}" cy="{ry}" rx="{rx}" ry="{ry}" fill="{fill}"/></svg>"#,
                fill = color.css_hex(),
            )
        }
    }
}

fn text_svg(spec: &TextSpec) -> String {
    let size = spec.size_px.max(1.0);
    // Conservative box; the sprite is drawn centered so slack only costs
    // transparent pixels.
    let width = (size * 0.62 * (spec.content.chars().count().max(1) as f64)).ceil();
    let height = (size * 1.3).ceil();
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"><text x="0" y="{baseline}" font-family="{family}" font-size="{size}" fill="{fill}">{content}</text></svg>"#,
        baseline = size,
        family = xml_escape(&spec.font_family),
        fill = spec.color.css_hex(),
        content = xml_escape(&spec.content),
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_raw(1, 1, rgba.to_vec()).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_image_premultiplies() {
        let sprite = decode_image(&png_bytes([100, 50, 200, 128])).unwrap();
        assert_eq!(sprite.width, 1);
        assert_eq!(sprite.height, 1);
        assert_eq!(
            sprite.data.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn image_from_bytes_is_memoized() {
        let mut store = AssetStore::new(".");
        store.image_from_bytes("k", &png_bytes([255, 0, 0, 255])).unwrap();
        assert!(store.contains("k"));
        // Second call with garbage bytes must hit the cache, not decode.
        store.image_from_bytes("k", b"not an image").unwrap();
    }

    #[test]
    fn shape_rect_rasterizes_solid_fill() {
        let mut store = AssetStore::new(".");
        let sprite = store
            .shape(
                "rect",
                &ShapeSpec::Rect {
                    width: 4.0,
                    height: 4.0,
                    corner_radius: 0.0,
                },
                Rgba8::new(255, 0, 0, 255),
            )
            .unwrap();
        assert_eq!(sprite.width, 4);
        assert_eq!(sprite.height, 4);
        // Center pixel is opaque red (premultiplied).
        let idx = (4 * 2 + 2) * 4;
        assert_eq!(&sprite.data[idx..idx + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn generated_text_svg_escapes_content() {
        let spec = TextSpec {
            content: "a<b&c".to_string(),
            size_px: 12.0,
            color: Rgba8::WHITE,
            font_family: "sans-serif".to_string(),
        };
        let svg = text_svg(&spec);
        assert!(svg.contains("a&lt;b&amp;c"));
        assert!(!svg.contains("a<b"));
    }
}
