//! Coin selection: the smallest set of coins covering a target amount.
//!
//! Policy, in order:
//! 1. a single coin matching the target exactly (no change output);
//! 2. the smallest single coin above the target;
//! 3. largest coins first until the target is covered.
//!
//! Ties are broken by coin id, so the result is deterministic for a given
//! candidate set.

use offerswap_types::{AssetId, Coin, OfferswapError, Result};

/// Pick coins of `asset` from `candidates` summing to at least `target`.
///
/// `candidates` must already exclude locked coins. Coins of other asset
/// classes are ignored.
///
/// # Errors
/// Returns `InsufficientFunds` if the candidates cannot cover `target`.
pub fn select_coins(candidates: &[Coin], asset: &AssetId, target: u64) -> Result<Vec<Coin>> {
    let mut pool: Vec<Coin> = candidates
        .iter()
        .filter(|coin| coin.asset == *asset && coin.amount > 0)
        .copied()
        .collect();
    // Largest first; equal amounts ordered by id.
    pool.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.id().cmp(&b.id())));

    let available = pool
        .iter()
        .fold(0u64, |acc, coin| acc.saturating_add(coin.amount));
    if target == 0 {
        return Ok(Vec::new());
    }
    if available < target {
        return Err(OfferswapError::InsufficientFunds {
            asset: *asset,
            needed: target,
            available,
        });
    }

    if let Some(exact) = pool.iter().find(|coin| coin.amount == target) {
        return Ok(vec![*exact]);
    }
    if let Some(smallest_above) = pool.iter().rev().find(|coin| coin.amount > target) {
        return Ok(vec![*smallest_above]);
    }

    let mut selected = Vec::new();
    let mut total = 0u64;
    for coin in pool {
        if total >= target {
            break;
        }
        total = total.saturating_add(coin.amount);
        selected.push(coin);
    }
    Ok(selected)
}

/// Total of a coin set.
#[must_use]
pub fn total_amount(coins: &[Coin]) -> u64 {
    coins
        .iter()
        .fold(0u64, |acc, coin| acc.saturating_add(coin.amount))
}

#[cfg(test)]
mod tests {
    use offerswap_types::{PuzzleHash, TokenColour};

    use super::*;

    fn coins(amounts: &[u64]) -> Vec<Coin> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                Coin::dummy(
                    u8::try_from(i).unwrap(),
                    PuzzleHash([1u8; 32]),
                    *amount,
                    AssetId::Native,
                )
            })
            .collect()
    }

    fn amounts(selected: &[Coin]) -> Vec<u64> {
        selected.iter().map(|coin| coin.amount).collect()
    }

    #[test]
    fn exact_match_wins() {
        let pool = coins(&[50, 30, 100]);
        let selected = select_coins(&pool, &AssetId::Native, 30).unwrap();
        assert_eq!(amounts(&selected), vec![30]);
    }

    #[test]
    fn smallest_single_coin_above_target() {
        let pool = coins(&[50, 40, 100, 5]);
        let selected = select_coins(&pool, &AssetId::Native, 35).unwrap();
        assert_eq!(amounts(&selected), vec![40]);
    }

    #[test]
    fn largest_first_accumulation() {
        let pool = coins(&[10, 20, 30, 5]);
        let selected = select_coins(&pool, &AssetId::Native, 45).unwrap();
        assert_eq!(amounts(&selected), vec![30, 20]);
        assert!(total_amount(&selected) >= 45);
    }

    #[test]
    fn insufficient_funds_reports_available() {
        let pool = coins(&[10, 20]);
        let err = select_coins(&pool, &AssetId::Native, 31).unwrap_err();
        assert!(matches!(
            err,
            OfferswapError::InsufficientFunds {
                needed: 31,
                available: 30,
                ..
            }
        ));
    }

    #[test]
    fn other_assets_are_ignored() {
        let token = AssetId::Token(TokenColour([2u8; 32]));
        let pool = coins(&[100]);
        assert!(select_coins(&pool, &token, 1).is_err());
    }

    #[test]
    fn selection_is_deterministic() {
        let pool = coins(&[10, 10, 10, 10]);
        let mut reversed = pool.clone();
        reversed.reverse();
        assert_eq!(
            select_coins(&pool, &AssetId::Native, 25).unwrap(),
            select_coins(&reversed, &AssetId::Native, 25).unwrap()
        );
    }
}
