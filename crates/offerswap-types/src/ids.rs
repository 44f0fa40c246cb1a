//! Identifiers used throughout offerswap.
//!
//! Everything the chain can see is content-addressed with SHA-256 under a
//! domain tag, so two parties that never talk to each other still derive the
//! same ids for the same coins, bundles and trades. Only [`TradeId`] is a
//! UUID, built from the first 16 bytes of a bundle digest.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{OfferswapError, constants};

/// Serde helper: `[u8; 32]` as a lowercase hex string.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(d)?;
        super::parse_hex32(&text).map_err(D::Error::custom)
    }
}

/// Serde helper: variable-length bytes as a lowercase hex string.
pub mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(D::Error::custom)
    }
}

fn parse_hex32(text: &str) -> Result<[u8; 32], OfferswapError> {
    let raw = hex::decode(text)
        .map_err(|e| OfferswapError::Serialization(format!("bad hex id: {e}")))?;
    raw.try_into()
        .map_err(|_| OfferswapError::Serialization(format!("id must be 32 bytes: {text}")))
}

/// Domain-separated SHA-256 over a list of byte slices.
#[must_use]
pub fn tagged_hash(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex32")] pub [u8; 32]);

        impl $name {
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First four bytes in hex, for log lines.
            #[must_use]
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.short())
            }
        }
    };
}

digest_id!(
    /// Unique coin identifier, derived from the coin's creation context.
    CoinId,
    "coin:"
);

digest_id!(
    /// Commitment to a spending condition ([`crate::Puzzle`]).
    PuzzleHash,
    "ph:"
);

digest_id!(
    /// Digest of a spend bundle's spends (signatures excluded).
    BundleId,
    "bundle:"
);

digest_id!(
    /// Colour of a token asset class: the hash of its genesis checker.
    TokenColour,
    ""
);

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Identifier of an asset class. [`AssetId::Native`] is the ledger's base asset.
///
/// Serializes as a string (`"native"` or the token colour in hex) so that it
/// can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum AssetId {
    Native,
    Token(TokenColour),
}

impl AssetId {
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Canonical bytes used inside hashes.
    #[must_use]
    pub fn hash_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        if let Self::Token(colour) = self {
            out[0] = 1;
            out[1..].copy_from_slice(&colour.0);
        }
        out
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str(constants::NATIVE_ASSET_NAME),
            Self::Token(colour) => write!(f, "{colour}"),
        }
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str(constants::NATIVE_ASSET_NAME),
            Self::Token(colour) => write!(f, "token:{}", colour.short()),
        }
    }
}

impl FromStr for AssetId {
    type Err = OfferswapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == constants::NATIVE_ASSET_NAME {
            return Ok(Self::Native);
        }
        parse_hex32(s).map(|bytes| Self::Token(TokenColour(bytes)))
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TradeId
// ---------------------------------------------------------------------------

/// Trade identifier, shared by both parties.
///
/// Derived from the initiator's partial bundle, so the responder computes the
/// exact same id from the offer file without ever contacting the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    #[must_use]
    pub fn from_bundle(bundle_id: &BundleId) -> Self {
        let digest = tagged_hash(constants::TAG_TRADE_ID, &[bundle_id.as_bytes()]);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_string_roundtrip() {
        let token = AssetId::Token(TokenColour([7u8; 32]));
        let text = token.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<AssetId>().unwrap(), token);
        assert_eq!("native".parse::<AssetId>().unwrap(), AssetId::Native);
    }

    #[test]
    fn asset_id_rejects_garbage() {
        assert!("chia".parse::<AssetId>().is_err());
        assert!("abcd".parse::<AssetId>().is_err());
    }

    #[test]
    fn asset_id_keys_json_maps() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(AssetId::Native, -10i64);
        map.insert(AssetId::Token(TokenColour([1u8; 32])), 30);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"native\":-10"));
        let back: std::collections::BTreeMap<AssetId, i64> = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn native_sorts_first() {
        assert!(AssetId::Native < AssetId::Token(TokenColour([0u8; 32])));
    }

    #[test]
    fn trade_id_is_deterministic() {
        let bundle = BundleId([3u8; 32]);
        assert_eq!(TradeId::from_bundle(&bundle), TradeId::from_bundle(&bundle));
        assert_ne!(
            TradeId::from_bundle(&bundle),
            TradeId::from_bundle(&BundleId([4u8; 32]))
        );
    }

    #[test]
    fn tagged_hash_separates_parts() {
        let a = tagged_hash(b"t", &[b"ab", b"c"]);
        let b = tagged_hash(b"t", &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn coin_id_hex_serde() {
        let id = CoinId([0xab; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: CoinId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
