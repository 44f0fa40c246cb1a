//! Offer Codec: the portable text form of an offer.
//!
//! ```text
//!   "offer1" ‖ hex( checksum[32] ‖ json(Offer) )
//!   checksum = sha256(tag ‖ len ‖ json)
//! ```
//!
//! Decoding fails closed: anything that is not exactly a well-formed,
//! fully signed partial bundle is `MalformedOffer`.

use offerswap_types::{Offer, OfferswapError, Result, constants, tagged_hash};
use offerswap_wallet::verify_bundle;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

fn malformed(reason: impl Into<String>) -> OfferswapError {
    OfferswapError::MalformedOffer {
        reason: reason.into(),
    }
}

fn checksum(payload: &[u8]) -> [u8; 32] {
    tagged_hash(constants::TAG_CHECKSUM, &[payload])
}

/// Encode an offer to its text form.
///
/// # Errors
/// Returns `Serialization` if the offer cannot be serialized.
pub fn encode_offer(offer: &Offer) -> Result<String> {
    let payload = serde_json::to_vec(offer)?;
    let mut framed = Vec::with_capacity(32 + payload.len());
    framed.extend_from_slice(&checksum(&payload));
    framed.extend_from_slice(&payload);
    Ok(format!("{}{}", constants::OFFER_MAGIC, hex::encode(framed)))
}

/// Decode and structurally check an offer.
///
/// # Errors
/// Returns `MalformedOffer` for any input that is not a valid offer.
pub fn decode_offer(bytes: &[u8], max_bytes: usize) -> Result<Offer> {
    if bytes.len() > max_bytes {
        return Err(malformed(format!(
            "offer is {} bytes, limit is {max_bytes}",
            bytes.len()
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| malformed("offer is not text"))?
        .trim();
    let body = text
        .strip_prefix(constants::OFFER_MAGIC)
        .ok_or_else(|| malformed("missing offer prefix"))?;
    let framed = hex::decode(body).map_err(|e| malformed(format!("bad hex: {e}")))?;
    if framed.len() < 32 {
        return Err(malformed("truncated offer"));
    }
    let (sum, payload) = framed.split_at(32);
    if sum != checksum(payload) {
        return Err(malformed("checksum mismatch"));
    }
    let offer: Offer =
        serde_json::from_slice(payload).map_err(|e| malformed(format!("bad payload: {e}")))?;
    check_structure(&offer)?;
    Ok(offer)
}

fn check_structure(offer: &Offer) -> Result<()> {
    if offer.version != constants::OFFER_FORMAT_VERSION {
        return Err(malformed(format!("unsupported version {}", offer.version)));
    }
    offer
        .delta
        .validate(true)
        .map_err(|e| malformed(e.to_string()))?;
    if offer.terms.payments.is_empty() {
        return Err(malformed("offer requests nothing"));
    }
    if offer.terms.payments.iter().any(|payment| payment.amount == 0) {
        return Err(malformed("zero-amount payment"));
    }
    if offer.bundle.spends.is_empty() {
        return Err(malformed("offer spends nothing"));
    }
    if let Some(coin_id) = offer.bundle.duplicate_spend() {
        return Err(malformed(format!("coin {coin_id} spent twice")));
    }
    for spend in &offer.bundle.spends {
        if !spend.puzzle.requires_signature() {
            return Err(malformed(format!(
                "spend of {} is not an owned coin",
                spend.coin_id()
            )));
        }
        if spend.puzzle.puzzle_hash() != spend.coin.puzzle_hash {
            return Err(malformed(format!(
                "puzzle reveal does not match coin {}",
                spend.coin_id()
            )));
        }
    }
    for meta in &offer.assets {
        if meta.asset.is_native() {
            return Err(malformed("metadata for the native asset"));
        }
    }
    verify_bundle(&offer.bundle).map_err(|e| malformed(e.to_string()))
}

/// Write an encoded offer to `sink`. Returns the number of bytes written.
///
/// # Errors
/// Returns `Io` if the sink fails.
pub async fn write_offer<W>(sink: &mut W, offer: &Offer) -> Result<usize>
where
    W: AsyncWrite + Unpin + Send,
{
    let encoded = encode_offer(offer)?;
    sink.write_all(encoded.as_bytes()).await?;
    sink.flush().await?;
    Ok(encoded.len())
}

/// Read and decode an offer from `source`, reading at most one byte past
/// `max_bytes` so an oversized source is detected without buffering it.
///
/// # Errors
/// Returns `Io` if the source fails, `MalformedOffer` if its content does.
pub async fn read_offer<R>(source: &mut R, max_bytes: usize) -> Result<Offer>
where
    R: AsyncRead + Unpin + Send,
{
    let limit = u64::try_from(max_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut buffer = Vec::new();
    source.take(limit).read_to_end(&mut buffer).await?;
    decode_offer(&buffer, max_bytes)
}
