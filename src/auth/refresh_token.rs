/// Refresh Token Codec
///
/// A refresh token is a single-use credential made of a random UUID and the
/// network origin observed when it was issued. On the wire it travels as
/// standard base64 of `"{id}|{origin}"`; the same text is what the verifier
/// hashes, so the origin is bound to the credential for its whole lifetime.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{AppError, DecodeError};

const SEPARATOR: char = '|';

#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    id: Uuid,
    origin: String,
}

impl RefreshToken {
    /// Generate a fresh refresh token bound to `origin`
    ///
    /// # Errors
    /// Returns error if the origin contains the field separator
    pub fn generate(origin: &str) -> Result<Self, AppError> {
        Self::new(Uuid::new_v4(), origin)
    }

    pub fn new(id: Uuid, origin: &str) -> Result<Self, AppError> {
        if origin.contains(SEPARATOR) {
            return Err(AppError::Internal(format!(
                "origin {:?} contains the refresh token separator",
                origin
            )));
        }
        Ok(Self {
            id,
            origin: origin.to_string(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Canonical text form shared by the codec and the verifier
    pub fn canonical_text(&self) -> String {
        format!("{}{}{}", self.id, SEPARATOR, self.origin)
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(self.canonical_text())
    }

    pub fn decode(encoded: &str) -> Result<Self, DecodeError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| DecodeError::Base64)?;
        let text = String::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;

        let separators = text.matches(SEPARATOR).count();
        if separators != 1 {
            return Err(DecodeError::SeparatorCount(separators));
        }

        let (id, origin) = text
            .split_once(SEPARATOR)
            .ok_or(DecodeError::SeparatorCount(0))?;
        let id = Uuid::parse_str(id).map_err(|_| DecodeError::Identifier)?;

        Ok(Self {
            id,
            origin: origin.to_string(),
        })
    }
}

// Keeps the origin out of logs
impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Serialize for RefreshToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for RefreshToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        RefreshToken::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
