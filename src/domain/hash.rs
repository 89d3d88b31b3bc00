use std::{fmt, path::Path};

use anyhow::Context;
use blake3::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub Hash);

        impl $name {
            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(blake3::hash(bytes))
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex().to_string()
            }

            pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
                let hash = Hash::from_hex(hex)
                    .with_context(|| format!("'{hex}' is not a valid {}", stringify!($name)))?;
                Ok(Self(hash))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let hex = String::deserialize(deserializer)?;
                Self::from_hex(&hex).map_err(de::Error::custom)
            }
        }
    };
}

content_id!(
    /// Represents the track ID.
    ///
    /// Imported files are identified by the hash of their bytes,
    /// tracks registered by URL by the hash of the URL.
    TrackId
);

content_id!(
    /// Album ID, derived from the normalized album title.
    AlbumId
);

impl TrackId {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn from_locator(locator: &str) -> Self {
        Self::from_bytes(locator.trim().as_bytes())
    }
}

impl AlbumId {
    pub fn from_title(title: &str) -> Self {
        Self::from_bytes(title.trim().to_lowercase().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() -> anyhow::Result<()> {
        let id = TrackId::from_bytes(b"song");
        assert_eq!(TrackId::from_hex(&id.to_hex())?, id);
        assert_eq!(id.to_string(), id.to_hex());
        Ok(())
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(TrackId::from_hex("not-a-valid-id").is_err());
        assert!(AlbumId::from_hex("123").is_err());
    }

    #[test]
    fn album_id_ignores_case_and_padding() {
        assert_eq!(
            AlbumId::from_title("  Gece Yolcusu "),
            AlbumId::from_title("gece yolcusu")
        );
    }

    #[test]
    fn serializes_as_hex_string() -> anyhow::Result<()> {
        let id = TrackId::from_locator("https://cdn.example/a.mp3");
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, format!("\"{}\"", id.to_hex()));

        let back: TrackId = serde_json::from_str(&json)?;
        assert_eq!(back, id);
        Ok(())
    }
}
