//! Signing oracle and its ed25519 implementation.
//!
//! A bundle's "aggregate" signature is the ordered list of fragments of its
//! signed spends. [`verify_bundle`] is what a ledger checks before accepting it.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use offerswap_types::{
    AggregateSignature, OfferswapError, Puzzle, PuzzleHash, Result, SignatureFragment, SpendBundle,
    SpendIntent,
};

/// Opaque signer. Key management lives behind this trait.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// The key that owns this wallet's standard coins.
    fn public_key(&self) -> [u8; 32];

    /// The wallet's own standard puzzle.
    fn puzzle(&self) -> Puzzle {
        Puzzle::standard(self.public_key())
    }

    /// Where this wallet receives value.
    fn puzzle_hash(&self) -> PuzzleHash {
        self.puzzle().puzzle_hash()
    }

    /// Sign one spend of a coin this wallet owns.
    async fn partially_sign(&self, intent: &SpendIntent) -> Result<SignatureFragment>;

    /// Combine fragments (in spend order) into the bundle signature.
    fn aggregate(&self, fragments: Vec<SignatureFragment>) -> Result<AggregateSignature> {
        if fragments.is_empty() {
            return Err(OfferswapError::SigningFailed {
                reason: "nothing to aggregate".into(),
            });
        }
        Ok(AggregateSignature { fragments })
    }
}

/// In-process ed25519 key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    #[must_use]
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    /// Fresh random key.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ed25519Signer({})",
            hex::encode(&self.key.verifying_key().to_bytes()[..4])
        )
    }
}

#[async_trait]
impl SigningOracle for Ed25519Signer {
    fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    async fn partially_sign(&self, intent: &SpendIntent) -> Result<SignatureFragment> {
        let public_key = self.public_key();
        match &intent.puzzle {
            Puzzle::Standard { owner } if *owner == public_key => {}
            _ => {
                return Err(OfferswapError::SigningFailed {
                    reason: format!("coin {} is not owned by this key", intent.coin_id()),
                });
            }
        }
        let signature = self.key.sign(&intent.message());
        Ok(SignatureFragment {
            public_key,
            signature: signature.to_bytes().to_vec(),
        })
    }
}

/// Check one fragment against the spend it claims to authorize.
#[must_use]
pub fn verify_fragment(intent: &SpendIntent, fragment: &SignatureFragment) -> bool {
    let Puzzle::Standard { owner } = &intent.puzzle else {
        return false;
    };
    if *owner != fragment.public_key {
        return false;
    }
    let Ok(key) = VerifyingKey::from_bytes(&fragment.public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&fragment.signature) else {
        return false;
    };
    key.verify(&intent.message(), &signature).is_ok()
}

/// Every standard spend is signed by its owner and the aggregate lists
/// exactly those fragments, in spend order.
///
/// # Errors
/// Returns `SigningFailed` naming the first spend that is not authorized.
pub fn verify_bundle(bundle: &SpendBundle) -> Result<()> {
    let mut expected = Vec::new();
    for spend in &bundle.spends {
        if !spend.puzzle.requires_signature() {
            continue;
        }
        let fragment = spend
            .signature
            .as_ref()
            .filter(|fragment| verify_fragment(spend, fragment))
            .ok_or_else(|| OfferswapError::SigningFailed {
                reason: format!("spend of {} is not authorized", spend.coin_id()),
            })?;
        expected.push(fragment);
    }
    let aggregated = bundle
        .aggregated_signature
        .as_ref()
        .map(|aggregate| aggregate.fragments.iter().collect::<Vec<_>>())
        .unwrap_or_default();
    if aggregated != expected {
        return Err(OfferswapError::SigningFailed {
            reason: "aggregate signature does not match spend fragments".into(),
        });
    }
    Ok(())
}

/// Sign every unsigned spend this oracle owns, then rebuild the aggregate
/// over all fragments in the bundle.
///
/// # Errors
/// Propagates `SigningFailed` from the oracle.
pub async fn sign_bundle(bundle: &mut SpendBundle, signer: &dyn SigningOracle) -> Result<()> {
    let own_key = signer.public_key();
    for spend in &mut bundle.spends {
        let owned = matches!(&spend.puzzle, Puzzle::Standard { owner } if *owner == own_key);
        if owned && spend.signature.is_none() {
            spend.signature = Some(signer.partially_sign(spend).await?);
        }
    }
    let fragments = bundle
        .spends
        .iter()
        .filter_map(|spend| spend.signature.clone())
        .collect();
    bundle.aggregated_signature = Some(signer.aggregate(fragments)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use offerswap_types::{AssetId, Coin, Condition};

    use super::*;

    fn spend_for(signer: &Ed25519Signer, seed: u8) -> SpendIntent {
        let puzzle = signer.puzzle();
        let coin = Coin::dummy(seed, puzzle.puzzle_hash(), 100, AssetId::Native);
        SpendIntent::new(
            coin,
            puzzle,
            vec![Condition::CreateCoin {
                puzzle_hash: PuzzleHash([7u8; 32]),
                amount: 100,
            }],
        )
    }

    #[tokio::test]
    async fn sign_and_verify_fragment() {
        let signer = Ed25519Signer::generate();
        let spend = spend_for(&signer, 1);
        let fragment = signer.partially_sign(&spend).await.unwrap();
        assert!(verify_fragment(&spend, &fragment));

        let mut tampered = spend.clone();
        tampered.conditions.clear();
        assert!(!verify_fragment(&tampered, &fragment));
    }

    #[tokio::test]
    async fn refuses_foreign_coin() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let spend = spend_for(&other, 1);
        let err = signer.partially_sign(&spend).await.unwrap_err();
        assert!(matches!(err, OfferswapError::SigningFailed { .. }));
    }

    #[tokio::test]
    async fn two_signers_share_one_bundle() {
        let alice = Ed25519Signer::generate();
        let bob = Ed25519Signer::generate();
        let mut bundle = SpendBundle::new(vec![spend_for(&alice, 1)]);
        sign_bundle(&mut bundle, &alice).await.unwrap();
        assert!(verify_bundle(&bundle).is_ok());

        bundle.merge(SpendBundle::new(vec![spend_for(&bob, 2)]));
        assert!(verify_bundle(&bundle).is_err(), "bob's spend is unsigned");

        sign_bundle(&mut bundle, &bob).await.unwrap();
        assert!(verify_bundle(&bundle).is_ok());
        assert_eq!(
            bundle.aggregated_signature.as_ref().unwrap().fragments.len(),
            2
        );
    }

    #[tokio::test]
    async fn aggregate_must_match_fragments() {
        let signer = Ed25519Signer::generate();
        let mut bundle = SpendBundle::new(vec![spend_for(&signer, 1), spend_for(&signer, 2)]);
        sign_bundle(&mut bundle, &signer).await.unwrap();
        bundle
            .aggregated_signature
            .as_mut()
            .unwrap()
            .fragments
            .reverse();
        assert!(verify_bundle(&bundle).is_err());
    }
}
