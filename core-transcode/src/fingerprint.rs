//! # Transcode Fingerprints
//!
//! Identity of a producible artifact: which media, at which resolution, in
//! which container. The coordinator keys its job table by fingerprint and the
//! cache ledger persists the same triple, so the two layers always agree on
//! what "the same artifact" means.

use crate::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Media Identity
// ============================================================================

/// Identifier of a media item in the external catalog.
///
/// Opaque to the engine; the catalog owns its format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Output Parameters
// ============================================================================

/// Target resolution of a transcoded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
    /// Keep the source resolution (remux-only transcodes).
    #[serde(rename = "original")]
    Original,
}

impl Resolution {
    /// Get the string representation used in fingerprints and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
            Resolution::P2160 => "2160p",
            Resolution::Original => "original",
        }
    }

    /// Vertical pixel count, or `None` when the source resolution is kept.
    pub fn height(&self) -> Option<u32> {
        match self {
            Resolution::P480 => Some(480),
            Resolution::P720 => Some(720),
            Resolution::P1080 => Some(1080),
            Resolution::P2160 => Some(2160),
            Resolution::Original => None,
        }
    }
}

impl FromStr for Resolution {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "480p" => Ok(Resolution::P480),
            "720p" => Ok(Resolution::P720),
            "1080p" => Ok(Resolution::P1080),
            "2160p" => Ok(Resolution::P2160),
            "original" => Ok(Resolution::Original),
            _ => Err(TranscodeError::InvalidResolution(s.to_string())),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Container format of a transcoded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Webm,
    Mkv,
}

impl ContainerFormat {
    /// Get the string representation used in fingerprints and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mkv => "mkv",
        }
    }

    /// File extension for artifacts in this container.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type used when serving artifacts over HTTP.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Mkv => "video/x-matroska",
        }
    }
}

impl FromStr for ContainerFormat {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(ContainerFormat::Mp4),
            "webm" => Ok(ContainerFormat::Webm),
            "mkv" => Ok(ContainerFormat::Mkv),
            _ => Err(TranscodeError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Composite key identifying one producible artifact.
///
/// Two requests with the same fingerprint are requests for the same file;
/// the coordinator guarantees at most one of them runs a producer.
///
/// The canonical text form is `media_id:resolution:format`:
///
/// ```rust
/// use core_transcode::fingerprint::{ContainerFormat, MediaId, Resolution, TranscodeFingerprint};
///
/// let fingerprint = TranscodeFingerprint::new(
///     MediaId::new("M1"),
///     Resolution::P720,
///     ContainerFormat::Mp4,
/// );
/// assert_eq!(fingerprint.to_string(), "M1:720p:mp4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscodeFingerprint {
    pub media_id: MediaId,
    pub resolution: Resolution,
    pub format: ContainerFormat,
}

impl TranscodeFingerprint {
    pub fn new(media_id: MediaId, resolution: Resolution, format: ContainerFormat) -> Self {
        Self {
            media_id,
            resolution,
            format,
        }
    }

    /// Stable hash of the canonical form, suitable for flat file names and
    /// ledger keys regardless of what characters the media ID contains.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// File name for this fingerprint's artifact inside the cache directory.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.{}", self.cache_key(), self.format.extension())
    }
}

impl fmt::Display for TranscodeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.media_id, self.resolution, self.format)
    }
}

impl FromStr for TranscodeFingerprint {
    type Err = TranscodeError;

    /// Parses the canonical `media_id:resolution:format` form.
    ///
    /// Media IDs may themselves contain `:`; only the final two segments are
    /// interpreted as resolution and format.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.rsplitn(3, ':');
        let format = parts.next();
        let resolution = parts.next();
        let media_id = parts.next();

        match (media_id, resolution, format) {
            (Some(media_id), Some(resolution), Some(format)) if !media_id.is_empty() => {
                Ok(Self {
                    media_id: MediaId::new(media_id),
                    resolution: resolution.parse()?,
                    format: format.parse()?,
                })
            }
            _ => Err(TranscodeError::InvalidFingerprint(s.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> TranscodeFingerprint {
        TranscodeFingerprint::new(MediaId::new("M1"), Resolution::P720, ContainerFormat::Mp4)
    }

    #[test]
    fn test_display_round_trip() {
        let fp = fingerprint();
        assert_eq!(fp.to_string(), "M1:720p:mp4");
        assert_eq!("M1:720p:mp4".parse::<TranscodeFingerprint>().unwrap(), fp);
    }

    #[test]
    fn test_parse_media_id_with_colons() {
        let fp = "drive:folder/9:1080p:webm"
            .parse::<TranscodeFingerprint>()
            .unwrap();
        assert_eq!(fp.media_id.as_str(), "drive:folder/9");
        assert_eq!(fp.resolution, Resolution::P1080);
        assert_eq!(fp.format, ContainerFormat::Webm);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<TranscodeFingerprint>().is_err());
        assert!("M1:720p".parse::<TranscodeFingerprint>().is_err());
        assert!(":720p:mp4".parse::<TranscodeFingerprint>().is_err());
        assert!("M1:999p:mp4".parse::<TranscodeFingerprint>().is_err());
        assert!("M1:720p:avi".parse::<TranscodeFingerprint>().is_err());
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("720p".parse::<Resolution>().unwrap(), Resolution::P720);
        assert_eq!("ORIGINAL".parse::<Resolution>().unwrap(), Resolution::Original);
        assert!("4k".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_height() {
        assert_eq!(Resolution::P480.height(), Some(480));
        assert_eq!(Resolution::P2160.height(), Some(2160));
        assert_eq!(Resolution::Original.height(), None);
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ContainerFormat::Mp4.extension(), "mp4");
        assert_eq!(ContainerFormat::Webm.mime_type(), "video/webm");
        assert_eq!(ContainerFormat::Mkv.mime_type(), "video/x-matroska");
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        let fp = fingerprint();
        assert_eq!(fp.cache_key(), fp.cache_key());
        assert_eq!(fp.cache_key().len(), 64);

        let other =
            TranscodeFingerprint::new(MediaId::new("M1"), Resolution::P1080, ContainerFormat::Mp4);
        assert_ne!(fp.cache_key(), other.cache_key());
    }

    #[test]
    fn test_artifact_file_name_uses_extension() {
        let fp = fingerprint();
        let name = fp.artifact_file_name();
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), 64 + 4);
    }

    #[test]
    fn test_serde_uses_canonical_labels() {
        let json = serde_json::to_string(&Resolution::P720).unwrap();
        assert_eq!(json, "\"720p\"");
        let json = serde_json::to_string(&ContainerFormat::Mkv).unwrap();
        assert_eq!(json, "\"mkv\"");
    }
}
