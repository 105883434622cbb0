use std::fmt;
use std::str::FromStr;

use super::error::DriveError;

/// A registered data platform.
///
/// This enum is the registration table: every token the service answers to is
/// listed in [`Platform::ALL`], and the per-platform parameter grammar and
/// client factory hang off it in `crate::platforms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Columnar warehouse (BigQuery).
    Columnar,
    /// Document store (Firestore).
    Document,
    /// Relational store (Cloud SQL).
    Relational,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Columnar, Platform::Document, Platform::Relational];

    pub fn token(self) -> &'static str {
        match self {
            Platform::Columnar => "columnar",
            Platform::Document => "document",
            Platform::Relational => "relational",
        }
    }

    /// Path shape reported back to callers when the parameters do not fit.
    pub fn path_shape(self) -> &'static str {
        match self {
            Platform::Columnar => "/columnar/<project>/<dataset>/<view>",
            Platform::Document => "/document/<project>/<collection>/<document>/<collection>/...",
            Platform::Relational => "/relational/<project>/<engine>/<instance>/<database>/<table>",
        }
    }

    pub fn tokens() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.token()).collect()
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.token() == token)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Platform {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| DriveError::UnknownPlatform {
            token: s.to_string(),
            supported: Self::tokens(),
        })
    }
}
