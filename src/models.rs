use std::collections::BTreeSet;
use std::fmt;

use base64::Engine;
use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ImageError, InputError};

pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];
pub const FEEDBACK_MIN_CHARS: usize = 10;
pub const FEEDBACK_MAX_CHARS: usize = 1000;

/// The closed set of sustainability preferences a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Preference {
    #[serde(rename = "Low Carbon Footprint")]
    LowCarbonFootprint,
    #[serde(rename = "Water Conservation")]
    WaterConservation,
    #[serde(rename = "Recycled Materials")]
    RecycledMaterials,
    #[serde(rename = "Renewable Materials")]
    RenewableMaterials,
    #[serde(rename = "High Recyclability")]
    HighRecyclability,
}

impl Preference {
    pub const ALL: [Preference; 5] = [
        Preference::LowCarbonFootprint,
        Preference::WaterConservation,
        Preference::RecycledMaterials,
        Preference::RenewableMaterials,
        Preference::HighRecyclability,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Preference::LowCarbonFootprint => "Low Carbon Footprint",
            Preference::WaterConservation => "Water Conservation",
            Preference::RecycledMaterials => "Recycled Materials",
            Preference::RenewableMaterials => "Renewable Materials",
            Preference::HighRecyclability => "High Recyclability",
        }
    }
}

impl std::str::FromStr for Preference {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Preference::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InputError::UnknownPreference(wanted.to_string()))
    }
}

pub type Preferences = BTreeSet<Preference>;

pub fn parse_preferences<I, S>(labels: I) -> Result<Preferences, InputError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels.into_iter().map(|l| l.as_ref().parse()).collect()
}

pub fn preference_labels(preferences: &Preferences) -> Vec<String> {
    preferences.iter().map(|p| p.label().to_string()).collect()
}

/// A validated product photo.
#[derive(Clone, PartialEq, Eq)]
pub struct ProductImage {
    mime_type: String,
    bytes: Bytes,
}

impl ProductImage {
    pub fn from_bytes(mime_type: &str, bytes: Bytes) -> Result<Self, ImageError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        let expected = match mime_type.as_str() {
            "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
            "image/png" => ImageFormat::Png,
            "image/webp" => ImageFormat::WebP,
            _ => return Err(ImageError::UnsupportedType(mime_type)),
        };
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge { size: bytes.len(), max: MAX_IMAGE_BYTES });
        }
        match image::guess_format(&bytes) {
            Ok(found) if found == expected => Ok(Self { mime_type, bytes }),
            _ => Err(ImageError::NotAnImage),
        }
    }

    /// Parse `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, ImageError> {
        let rest = uri.trim().strip_prefix("data:").ok_or(ImageError::NotDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageError::NotDataUri)?;
        let mime_type = header.strip_suffix(";base64").ok_or(ImageError::NotDataUri)?;
        if !ACCEPTED_IMAGE_TYPES.contains(&mime_type.to_ascii_lowercase().as_str()) {
            return Err(ImageError::UnsupportedType(mime_type.to_string()));
        }
        // base64 inflates by 4/3; reject oversized payloads before decoding
        if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
            return Err(ImageError::TooLarge { size: payload.len() / 4 * 3, max: MAX_IMAGE_BYTES });
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        Self::from_bytes(mime_type, Bytes::from(bytes))
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ProductImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Images are reported by type and size only; the payload never leaves the run.
impl Serialize for ProductImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ProductImage", 2)?;
        s.serialize_field("mimeType", &self.mime_type)?;
        s.serialize_field("sizeBytes", &self.bytes.len())?;
        s.end()
    }
}

/// What the user submitted. Exactly one primary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum ProductInput {
    Description {
        description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<ProductImage>,
    },
    Url {
        #[serde(rename = "sourceUrl")]
        source_url: String,
    },
}

impl ProductInput {
    pub fn describe(description: &str, image: Option<ProductImage>) -> Result<Self, InputError> {
        let description = check_description(description)?;
        Ok(ProductInput::Description { description, image })
    }

    pub fn from_url(url: &str) -> Result<Self, InputError> {
        let parsed = reqwest::Url::parse(url.trim()).map_err(|e| InputError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InputError::InvalidUrl(format!("unsupported scheme `{}`", parsed.scheme())));
        }
        Ok(ProductInput::Url { source_url: parsed.to_string() })
    }

    pub fn is_url(&self) -> bool {
        matches!(self, ProductInput::Url { .. })
    }

    pub fn image(&self) -> Option<&ProductImage> {
        match self {
            ProductInput::Description { image, .. } => image.as_ref(),
            ProductInput::Url { .. } => None,
        }
    }
}

/// Trim and bound-check a description. Length is counted in characters.
pub fn check_description(description: &str) -> Result<String, InputError> {
    let trimmed = description.trim();
    let actual = trimmed.chars().count();
    if !(DESCRIPTION_MIN_CHARS..=DESCRIPTION_MAX_CHARS).contains(&actual) {
        return Err(InputError::DescriptionLength {
            min: DESCRIPTION_MIN_CHARS,
            max: DESCRIPTION_MAX_CHARS,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

/// Cut `text` to at most `max` characters on a character boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// `data:<mime>;base64,...`
    #[serde(default)]
    pub image_data_uri: Option<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl AnalyzeRequest {
    pub fn into_submission(self) -> Result<(ProductInput, Preferences), InputError> {
        let preferences = parse_preferences(&self.preferences)?;
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let input = match (non_blank(self.description), non_blank(self.source_url)) {
            (Some(_), Some(_)) => return Err(InputError::AmbiguousSource),
            (None, None) => return Err(InputError::MissingSource),
            (None, Some(url)) => {
                if self.image_data_uri.is_some() {
                    return Err(InputError::ImageWithoutDescription);
                }
                ProductInput::from_url(&url)?
            }
            (Some(description), None) => {
                let image = self
                    .image_data_uri
                    .as_deref()
                    .map(ProductImage::from_data_uri)
                    .transpose()?;
                ProductInput::describe(&description, image)?
            }
        };
        Ok((input, preferences))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub feedback_text: String,
}

impl FeedbackRequest {
    pub fn validated(&self) -> Result<&str, InputError> {
        let text = self.feedback_text.trim();
        let len = text.chars().count();
        if !(FEEDBACK_MIN_CHARS..=FEEDBACK_MAX_CHARS).contains(&len) {
            return Err(InputError::FeedbackLength { min: FEEDBACK_MIN_CHARS, max: FEEDBACK_MAX_CHARS });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn png_data_uri() -> String {
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(PNG_MAGIC))
    }

    #[test]
    fn description_bounds_count_characters() {
        assert!(ProductInput::describe("SKU 12345", None).is_err());
        assert!(ProductInput::describe("SKU 123456", None).is_ok());
        // 10 multi-byte characters
        assert!(ProductInput::describe("éééééééééé", None).is_ok());
        let long = "a".repeat(DESCRIPTION_MAX_CHARS + 1);
        assert_eq!(
            ProductInput::describe(&long, None).unwrap_err(),
            InputError::DescriptionLength { min: 10, max: 2000, actual: 2001 }
        );
    }

    #[test]
    fn urls_must_be_http() {
        assert!(ProductInput::from_url("https://shop.example.com/p/123").unwrap().is_url());
        assert!(matches!(ProductInput::from_url("not a url"), Err(InputError::InvalidUrl(_))));
        assert!(matches!(ProductInput::from_url("ftp://example.com/x"), Err(InputError::InvalidUrl(_))));
    }

    #[test]
    fn preferences_are_a_closed_set() {
        let prefs = parse_preferences(["Recycled Materials", "low carbon footprint", "Recycled Materials"]).unwrap();
        assert_eq!(
            prefs.into_iter().collect::<Vec<_>>(),
            vec![Preference::LowCarbonFootprint, Preference::RecycledMaterials]
        );
        assert_eq!(
            parse_preferences(["Vegan"]).unwrap_err(),
            InputError::UnknownPreference("Vegan".into())
        );
    }

    #[test]
    fn image_data_uri_round_trips() {
        let image = ProductImage::from_data_uri(&png_data_uri()).unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.len(), PNG_MAGIC.len());
        assert_eq!(image.to_data_uri(), png_data_uri());
    }

    #[test]
    fn image_rejections() {
        assert_eq!(ProductImage::from_data_uri("hello").unwrap_err(), ImageError::NotDataUri);
        assert!(matches!(
            ProductImage::from_data_uri("data:image/gif;base64,R0lGOD"),
            Err(ImageError::UnsupportedType(_))
        ));
        assert!(matches!(
            ProductImage::from_data_uri("data:image/png;base64,@@@@"),
            Err(ImageError::Decode(_))
        ));
        // declared png, actually text
        let text = base64::engine::general_purpose::STANDARD.encode(b"definitely not an image");
        assert_eq!(
            ProductImage::from_data_uri(&format!("data:image/png;base64,{text}")).unwrap_err(),
            ImageError::NotAnImage
        );
        let huge = Bytes::from(vec![0u8; MAX_IMAGE_BYTES + 1]);
        assert!(matches!(ProductImage::from_bytes("image/png", huge), Err(ImageError::TooLarge { .. })));
    }

    #[test]
    fn request_needs_exactly_one_source() {
        let both = AnalyzeRequest {
            description: Some("A bamboo toothbrush".into()),
            source_url: Some("https://example.com/brush".into()),
            ..Default::default()
        };
        assert_eq!(both.into_submission().unwrap_err(), InputError::AmbiguousSource);

        let neither = AnalyzeRequest { description: Some("   ".into()), ..Default::default() };
        assert_eq!(neither.into_submission().unwrap_err(), InputError::MissingSource);

        let url_with_image = AnalyzeRequest {
            source_url: Some("https://example.com/brush".into()),
            image_data_uri: Some(png_data_uri()),
            ..Default::default()
        };
        assert_eq!(url_with_image.into_submission().unwrap_err(), InputError::ImageWithoutDescription);
    }

    #[test]
    fn bad_image_is_an_image_processing_failure() {
        let req = AnalyzeRequest {
            description: Some("A bamboo toothbrush".into()),
            image_data_uri: Some("data:image/png;base64,!!".into()),
            ..Default::default()
        };
        let err = req.into_submission().unwrap_err();
        assert_eq!(err.stage_kind(), Some(crate::error::StageErrorKind::ImageProcessingFailed));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn image_payload_is_not_serialized() {
        let input = ProductInput::describe(
            "Glass jar of honey, 500g",
            Some(ProductImage::from_data_uri(&png_data_uri()).unwrap()),
        )
        .unwrap();
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["source"], "description");
        assert_eq!(json["image"]["mimeType"], "image/png");
        assert!(json["image"].get("bytes").is_none());
    }
}
