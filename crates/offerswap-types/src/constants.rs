//! System-wide constants for the offerswap trade engine.

/// Display name of the native asset (also its string form in offer files).
pub const NATIVE_ASSET_NAME: &str = "native";

/// Prefix of an encoded offer blob. The rest is hex.
pub const OFFER_MAGIC: &str = "offer1";

/// Current offer payload format version.
pub const OFFER_FORMAT_VERSION: u16 = 1;

/// Default extension for offer files written to disk.
pub const DEFAULT_OFFER_FILE_EXTENSION: &str = "offer";

/// Default upper bound on an encoded offer read from a source (1 MiB).
pub const DEFAULT_MAX_OFFER_BYTES: usize = 1 << 20;

/// Default number of blocks a spend must be buried under before a trade is final.
pub const DEFAULT_CONFIRMATION_DEPTH: u32 = 3;

// Hash domain tags. Changing any of these changes every derived id.

pub const TAG_COIN_ID: &[u8] = b"offerswap:coin:v1:";
pub const TAG_PUZZLE: &[u8] = b"offerswap:puzzle:v1:";
pub const TAG_TERMS: &[u8] = b"offerswap:terms:v1:";
pub const TAG_PAYMENT: &[u8] = b"offerswap:payment:v1:";
pub const TAG_ANNOUNCEMENT: &[u8] = b"offerswap:announcement:v1:";
pub const TAG_SPEND_MESSAGE: &[u8] = b"offerswap:spend:v1:";
pub const TAG_BUNDLE: &[u8] = b"offerswap:bundle:v1:";
pub const TAG_TRADE_ID: &[u8] = b"offerswap:trade_id:v1:";
pub const TAG_OFFER_NONCE: &[u8] = b"offerswap:offer_nonce:v1:";
pub const TAG_CHECKSUM: &[u8] = b"offerswap:checksum:v1:";
pub const TAG_GENESIS: &[u8] = b"offerswap:genesis:v1:";
