//! Image Orientation Transformer
//!
//! Decides whether a layer image must be mirrored for the chosen plumbing side
//! and writes the flip/resize directives into the CDN URL.
//!
//! Directives live in one comma-joined path segment right after the upload
//! marker: `.../image/upload/a_hflip,w_800/v12/door.png`. The segment is parsed,
//! merged and re-emitted in canonical order, so adjusting twice is the same as
//! adjusting once.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::catalog::{ImageRef, PlumbingSide};
use crate::config::CdnConfig;

const FLIP_TOKEN: &str = "a_hflip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    Fill,
    Fit,
    Limit,
    Pad,
    Scale,
}

impl CropMode {
    fn as_str(&self) -> &'static str {
        match self {
            CropMode::Fill => "fill",
            CropMode::Fit => "fit",
            CropMode::Limit => "limit",
            CropMode::Pad => "pad",
            CropMode::Scale => "scale",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "fill" => Some(CropMode::Fill),
            "fit" => Some(CropMode::Fit),
            "limit" => Some(CropMode::Limit),
            "pad" => Some(CropMode::Pad),
            "scale" => Some(CropMode::Scale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Auto,
    Png,
    Jpg,
    Webp,
    Avif,
}

impl ImageFormat {
    fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Auto => "auto",
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ImageFormat::Auto),
            "png" => Some(ImageFormat::Png),
            "jpg" => Some(ImageFormat::Jpg),
            "webp" => Some(ImageFormat::Webp),
            "avif" => Some(ImageFormat::Avif),
            _ => None,
        }
    }
}

/// `auto` or an explicit level 1-100. Serialized as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Quality {
    Auto,
    Level(u8),
}

impl Quality {
    fn parse(s: &str) -> Option<Self> {
        if s == "auto" {
            return Some(Quality::Auto);
        }
        match s.parse::<u8>() {
            Ok(n) if (1..=100).contains(&n) => Some(Quality::Level(n)),
            _ => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Auto => f.write_str("auto"),
            Quality::Level(n) => write!(f, "{n}"),
        }
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

impl TryFrom<String> for Quality {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Quality::parse(&s).ok_or_else(|| format!("invalid quality {s:?}, expected auto or 1-100"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeOptions {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub crop: Option<CropMode>,
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub format: Option<ImageFormat>,
}

impl ResizeOptions {
    /// Stable string form, used in cache keys.
    pub fn cache_key(&self) -> String {
        let mut chain = DirectiveChain::default();
        chain.apply(self);
        chain.tokens().join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformDiagnostic {
    /// Reference could not be parsed as a URL
    Malformed,
    /// Not hosted by the configured CDN, or no upload marker in the path
    NotCdnHosted,
}

/// Result of [`ImageTransformer::adjust`].
///
/// `mirrored` is the mirroring decision. When `diagnostic` is set the
/// reference was passed through as-is, and a renderer that honors `mirrored`
/// has to flip the image itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustedImage {
    pub image: ImageRef,
    pub mirrored: bool,
    pub diagnostic: Option<TransformDiagnostic>,
}

/// Left is the canonical authoring side, so only a right target can require a
/// flip, and only for left-authored images.
pub fn should_mirror(variant_orientation: PlumbingSide, target: PlumbingSide) -> bool {
    matches!(
        (target, variant_orientation),
        (PlumbingSide::Right, PlumbingSide::Left)
    )
}

/// Managed directives parsed out of (or destined for) the directive segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DirectiveChain {
    flip: bool,
    width: Option<u32>,
    height: Option<u32>,
    crop: Option<CropMode>,
    quality: Option<Quality>,
    format: Option<ImageFormat>,
    other: Vec<String>,
}

impl DirectiveChain {
    fn parse(segment: &str) -> Self {
        let mut chain = Self::default();
        for token in segment.split(',') {
            let Some((key, value)) = token.split_once('_') else {
                chain.other.push(token.to_string());
                continue;
            };
            let known = match key {
                "a" if token == FLIP_TOKEN => {
                    chain.flip = true;
                    true
                }
                "w" => value.parse::<u32>().map(|w| chain.width = Some(w)).is_ok(),
                "h" => value.parse::<u32>().map(|h| chain.height = Some(h)).is_ok(),
                "c" => CropMode::parse(value).map(|c| chain.crop = Some(c)).is_some(),
                "q" => Quality::parse(value).map(|q| chain.quality = Some(q)).is_some(),
                "f" => ImageFormat::parse(value).map(|f| chain.format = Some(f)).is_some(),
                _ => false,
            };
            if !known {
                chain.other.push(token.to_string());
            }
        }
        chain
    }

    fn apply(&mut self, opts: &ResizeOptions) {
        self.width = opts.width.or(self.width);
        self.height = opts.height.or(self.height);
        self.crop = opts.crop.or(self.crop);
        self.quality = opts.quality.or(self.quality);
        self.format = opts.format.or(self.format);
    }

    fn tokens(&self) -> Vec<String> {
        let mut tokens = self.other.clone();
        if self.flip {
            tokens.push(FLIP_TOKEN.to_string());
        }
        if let Some(w) = self.width {
            tokens.push(format!("w_{w}"));
        }
        if let Some(h) = self.height {
            tokens.push(format!("h_{h}"));
        }
        if let Some(c) = self.crop {
            tokens.push(format!("c_{}", c.as_str()));
        }
        if let Some(q) = self.quality {
            tokens.push(format!("q_{q}"));
        }
        if let Some(f) = self.format {
            tokens.push(format!("f_{}", f.as_str()));
        }
        tokens
    }
}

/// Transformation keys carried through without being interpreted.
const PASSTHROUGH_KEYS: &[&str] = &[
    "ar", "b", "bo", "co", "dpr", "e", "fl", "g", "l", "o", "pg", "r", "t", "x", "y", "z",
];

/// Crop modes the CDN knows beyond the ones [`CropMode`] models.
const EXTRA_CROP_MODES: &[&str] = &["crop", "thumb", "lfill", "mfit", "lpad", "mpad"];

/// A token the CDN would read as a transformation. Folder names like
/// `new_doors` or `top_rail` are not.
fn is_directive_token(token: &str) -> bool {
    let Some((key, value)) = token.split_once('_') else {
        return false;
    };
    if value.is_empty() {
        return false;
    }
    match key {
        "a" => matches!(value, "hflip" | "vflip" | "ignore") || value.parse::<i32>().is_ok(),
        "w" | "h" => value.parse::<u32>().is_ok(),
        "c" => CropMode::parse(value).is_some() || EXTRA_CROP_MODES.contains(&value),
        "q" => Quality::parse(value).is_some(),
        "f" => ImageFormat::parse(value).is_some(),
        _ => PASSTHROUGH_KEYS.contains(&key),
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

/// The transformer bound to one CDN.
#[derive(Debug, Clone, Default)]
pub struct ImageTransformer {
    cdn: CdnConfig,
}

impl ImageTransformer {
    pub fn new(cdn: CdnConfig) -> Self {
        Self { cdn }
    }

    pub fn cdn(&self) -> &CdnConfig {
        &self.cdn
    }

    /// Whether `image` is a URL on the configured CDN with an upload marker.
    pub fn is_cdn_hosted(&self, image: &ImageRef) -> bool {
        match Url::parse(image.as_str()) {
            Ok(url) => self.marker_offset(&url).is_some(),
            Err(_) => false,
        }
    }

    fn marker_offset(&self, url: &Url) -> Option<usize> {
        let host = url.host_str()?;
        if !host.eq_ignore_ascii_case(&self.cdn.host) {
            return None;
        }
        let idx = url.path().find(&self.cdn.upload_marker)?;
        let offset = idx + self.cdn.upload_marker.len();
        // Nothing to transform without a public id after the marker
        (offset < url.path().len()).then_some(offset)
    }

    /// Produce the reference to render for a variant image on `target`.
    ///
    /// Never fails: malformed or foreign references come back unchanged with a
    /// diagnostic.
    pub fn adjust(
        &self,
        image: &ImageRef,
        variant_orientation: PlumbingSide,
        target: PlumbingSide,
        opts: &ResizeOptions,
    ) -> AdjustedImage {
        let mirrored = should_mirror(variant_orientation, target);
        debug!(
            "Image {} authored {} for target {}: mirror={}",
            image, variant_orientation, target, mirrored
        );

        let passthrough = |diagnostic| AdjustedImage {
            image: image.clone(),
            mirrored,
            diagnostic: Some(diagnostic),
        };

        let mut url = match Url::parse(image.as_str()) {
            Ok(url) => url,
            Err(e) => {
                warn!("Malformed image reference {:?}: {}", image.as_str(), e);
                return passthrough(TransformDiagnostic::Malformed);
            }
        };

        let Some(offset) = self.marker_offset(&url) else {
            debug!("Image {} is not on CDN host {}", image, self.cdn.host);
            return passthrough(TransformDiagnostic::NotCdnHosted);
        };

        let path = url.path().to_string();
        let (prefix, rest) = path.split_at(offset);
        let mut segments: Vec<&str> = rest.split('/').collect();

        // The last segment is always the public id, never directives.
        let has_directives = segments.len() > 1
            && !is_version_segment(segments[0])
            && segments[0].split(',').all(is_directive_token);
        let existing = if has_directives {
            DirectiveChain::parse(segments.remove(0))
        } else {
            DirectiveChain::default()
        };

        let mut chain = existing.clone();
        chain.flip = mirrored;
        chain.apply(opts);

        if chain == existing {
            return AdjustedImage {
                image: image.clone(),
                mirrored,
                diagnostic: None,
            };
        }

        let tokens = chain.tokens();
        let new_path = if tokens.is_empty() {
            format!("{}{}", prefix, segments.join("/"))
        } else {
            format!("{}{}/{}", prefix, tokens.join(","), segments.join("/"))
        };
        url.set_path(&new_path);

        AdjustedImage {
            image: ImageRef::new(url.to_string()),
            mirrored,
            diagnostic: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOOR: &str = "https://res.cloudinary.com/demo/image/upload/v1700000000/doors/pivot.png";

    fn transformer() -> ImageTransformer {
        ImageTransformer::new(CdnConfig::default())
    }

    #[test]
    fn test_should_mirror_table() {
        use PlumbingSide::*;
        for o in [Left, Right, Both] {
            assert!(!should_mirror(o, Left));
            assert!(!should_mirror(o, Both));
        }
        assert!(should_mirror(Left, Right));
        assert!(!should_mirror(Right, Right));
        assert!(!should_mirror(Both, Right));
    }

    #[test]
    fn test_flip_inserted_after_marker() {
        let out = transformer().adjust(
            &DOOR.into(),
            PlumbingSide::Left,
            PlumbingSide::Right,
            &ResizeOptions::default(),
        );
        assert!(out.mirrored);
        assert_eq!(out.diagnostic, None);
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/a_hflip/v1700000000/doors/pivot.png"
        );
    }

    #[test]
    fn test_no_mirror_no_opts_is_unchanged() {
        let image: ImageRef = DOOR.into();
        let out = transformer().adjust(
            &image,
            PlumbingSide::Both,
            PlumbingSide::Right,
            &ResizeOptions::default(),
        );
        assert!(!out.mirrored);
        assert_eq!(out.image, image);
    }

    #[test]
    fn test_resize_tokens_are_canonical() {
        let opts = ResizeOptions {
            format: Some(ImageFormat::Webp),
            quality: Some(Quality::Auto),
            width: Some(800),
            height: None,
            crop: Some(CropMode::Limit),
        };
        let out = transformer().adjust(&DOOR.into(), PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/a_hflip,w_800,c_limit,q_auto,f_webp/v1700000000/doors/pivot.png"
        );
    }

    #[test]
    fn test_adjust_twice_keeps_single_flip() {
        let t = transformer();
        let opts = ResizeOptions {
            width: Some(400),
            ..Default::default()
        };
        let once = t.adjust(&DOOR.into(), PlumbingSide::Left, PlumbingSide::Right, &opts);
        let twice = t.adjust(&once.image, PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(once.image, twice.image);
        assert_eq!(twice.image.as_str().matches(FLIP_TOKEN).count(), 1);
    }

    #[test]
    fn test_stale_flip_removed_for_left_target() {
        let flipped: ImageRef =
            "https://res.cloudinary.com/demo/image/upload/a_hflip/v1/doors/pivot.png".into();
        let out = transformer().adjust(
            &flipped,
            PlumbingSide::Left,
            PlumbingSide::Left,
            &ResizeOptions::default(),
        );
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/v1/doors/pivot.png"
        );
    }

    #[test]
    fn test_unknown_tokens_preserved() {
        let image: ImageRef =
            "https://res.cloudinary.com/demo/image/upload/e_sharpen,w_100/v1/doors/pivot.png".into();
        let out = transformer().adjust(
            &image,
            PlumbingSide::Left,
            PlumbingSide::Right,
            &ResizeOptions::default(),
        );
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/e_sharpen,a_hflip,w_100/v1/doors/pivot.png"
        );
    }

    #[test]
    fn test_underscored_public_id_is_not_a_directive() {
        let image: ImageRef = "https://res.cloudinary.com/demo/image/upload/my_door.png".into();
        let out = transformer().adjust(
            &image,
            PlumbingSide::Left,
            PlumbingSide::Right,
            &ResizeOptions::default(),
        );
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/a_hflip/my_door.png"
        );
    }

    #[test]
    fn test_underscored_folder_stays_in_public_id() {
        let t = transformer();
        let opts = ResizeOptions::default();

        let foldered: ImageRef = "https://res.cloudinary.com/demo/image/upload/new_doors/pivot.png".into();
        let out = t.adjust(&foldered, PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/a_hflip/new_doors/pivot.png"
        );

        let nested: ImageRef =
            "https://res.cloudinary.com/demo/image/upload/top_rail/a_b/rail.png".into();
        let out = t.adjust(&nested, PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(
            out.image.as_str(),
            "https://res.cloudinary.com/demo/image/upload/a_hflip/top_rail/a_b/rail.png"
        );

        let again = t.adjust(&out.image, PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(again.image, out.image);
    }

    #[test]
    fn test_directive_token_recognition() {
        for token in ["a_hflip", "w_400", "c_thumb", "q_auto", "f_webp", "e_sharpen", "fl_lossy"] {
            assert!(is_directive_token(token), "{token}");
        }
        for token in ["new_doors", "old_panels", "top_rail", "a_b", "w_wide", "f_", "pivot"] {
            assert!(!is_directive_token(token), "{token}");
        }
    }

    #[test]
    fn test_foreign_and_malformed_pass_through() {
        let t = transformer();
        let foreign: ImageRef = "https://example.com/image/upload/door.png".into();
        let out = t.adjust(&foreign, PlumbingSide::Left, PlumbingSide::Right, &ResizeOptions::default());
        assert_eq!(out.image, foreign);
        assert!(out.mirrored);
        assert_eq!(out.diagnostic, Some(TransformDiagnostic::NotCdnHosted));

        let broken: ImageRef = "not a url".into();
        let out = t.adjust(&broken, PlumbingSide::Left, PlumbingSide::Right, &ResizeOptions::default());
        assert_eq!(out.image, broken);
        assert_eq!(out.diagnostic, Some(TransformDiagnostic::Malformed));
    }

    #[test]
    fn test_quality_serde() {
        let opts: ResizeOptions = serde_json::from_str(r#"{"quality": "80"}"#).unwrap();
        assert_eq!(opts.quality, Some(Quality::Level(80)));
        assert!(serde_json::from_str::<ResizeOptions>(r#"{"quality": "0"}"#).is_err());
    }
}
