use super::error::{DriveError, Result};
use super::platform::Platform;

/// Platform token plus at least one addressing parameter.
const MIN_SEGMENTS: usize = 2;

/// Parsed form of a request path: which platform to read from and the ordered
/// addressing parameters that follow the platform token.
///
/// Only the platform token is checked here; each adapter validates the
/// parameter list against its own grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    platform: Platform,
    params: Vec<String>,
}

impl ConnectionDescriptor {
    pub fn new(platform: Platform, params: Vec<String>) -> Self {
        Self { platform, params }
    }

    /// Parse a request path such as `/columnar/project/dataset/view`.
    ///
    /// Segments are percent-decoded after splitting, so an encoded `%2F` stays
    /// inside its segment.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();

        if segments.len() < MIN_SEGMENTS || segments[0].is_empty() {
            return Err(DriveError::malformed(format!(
                "expected a path of the form /<platform>/<param>/<param>/... with platform one of {}",
                Platform::tokens().join(", ")
            )));
        }

        let platform: Platform = decode_segment(segments[0])?.parse()?;
        let params = segments[1..]
            .iter()
            .map(|segment| decode_segment(segment))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { platform, params })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

fn decode_segment(segment: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DriveError::malformed(format!("path segment {segment:?} is not valid UTF-8: {e}")))
}
