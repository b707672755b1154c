pub mod distribution;
pub mod identification;
pub mod mass;
pub mod snapshot;
pub mod target_decoy;
pub mod validation;

use identification::MatchLevel;
use std::path::Path;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    MissingMatch {
        level: MatchLevel,
        key: String,
    },
    DuplicateMatch {
        level: MatchLevel,
        key: String,
    },
    /// `key` references a child match that doesn't exist
    InvalidReference {
        level: MatchLevel,
        key: String,
        reference: String,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::MissingMatch { level, key } => write!(f, "no {} match with key `{}`", level, key),
            Self::DuplicateMatch { level, key } => {
                write!(f, "{} match key `{}` is not unique", level, key)
            }
            Self::InvalidReference {
                level,
                key,
                reference,
            } => write!(
                f,
                "{} match `{}` references unknown match `{}`",
                level, key, reference
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
