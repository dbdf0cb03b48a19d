//! Pricing math: v2 constant-product and v3-local-constant-product quotes,
//! plus the `-ln(rate)` edge-weight transform (§4.4).
//!
//! Grounded on `PoolState::get_amount_out` (constant-product formula) and
//! `V3PoolState::price`/`price_from_tick` (sqrtPrice/tick conversion),
//! generalized to arbitrary `fee_bps` (the teacher hardcodes 997/1000)
//! and to a virtual-reserves treatment of v3 pools so v2 and v3 legs can
//! share one quote function.

use alloy::primitives::U256;

/// Exact constant-product output, generalized to arbitrary `fee_bps`
/// (teacher's `get_amount_out` hardcodes the V2 0.30% fee as 997/1000;
/// this is the same formula with `fee_bps` as a parameter, per §4.4's
/// `amountOut = (δ·(10000−fee_bps)·reserveOut) / (reserveIn·10000 + δ·(10000−fee_bps))`).
pub fn constant_product_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> U256 {
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_in.is_zero() {
        return U256::ZERO;
    }
    let fee_multiplier = U256::from(10_000u32 - fee_bps.min(10_000));
    let amount_in_with_fee = amount_in * fee_multiplier;
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(10_000u32) + amount_in_with_fee;
    if denominator.is_zero() {
        return U256::ZERO;
    }
    numerator / denominator
}

/// v3-concentrated pools behave, within the current tick, like a
/// constant-product pool with virtual reserves derived from `liquidity`
/// and `sqrtPriceX96`: `reserve0 = L·2^96 / sqrtP`, `reserve1 = L·sqrtP / 2^96`.
/// This is an explicit local approximation (no tick-crossing) — sufficient
/// for ranking and for the detector's executable quote per spec's stated
/// open question on v3 precision; large trades that cross ticks are
/// caught by the simulator's on-chain `eth_call` before submission.
pub fn v3_virtual_reserves(sqrt_price_x96: U256, liquidity: u128) -> (U256, U256) {
    let l = U256::from(liquidity);
    let q96 = U256::from(1u128) << 96;
    let sqrt_price = if sqrt_price_x96.is_zero() { U256::from(1) } else { sqrt_price_x96 };
    let reserve0 = (l * q96) / sqrt_price;
    let reserve1 = (l * sqrt_price) / q96;
    (reserve0, reserve1)
}

/// `(sqrtPrice/2^96)^2` as the spot price of token0 in terms of token1,
/// used only for edge weighting/ranking, never for the executable quote
/// (§9 open question: the original treats this as a detection-only proxy).
pub fn v3_spot_price(sqrt_price_x96: U256) -> f64 {
    let sqrt_price_f = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
    sqrt_price_f * sqrt_price_f
}

fn u256_to_f64(v: U256) -> f64 {
    // U256 has no direct f64 conversion; reserves realistically fit well
    // under 2^128 for any live pool, so truncating through u128 loses no
    // precision that matters for a heuristic weight.
    v.to::<u128>() as f64
}

/// Edge rate and weight at a reference input `delta` (native units of the
/// source token). Rate = amountOut/delta; weight = -ln(rate). Zero
/// reserves yield rate 0 and weight +infinity, per the boundary behavior
/// "edge effectively absent from shortest paths".
pub fn rate_and_weight(delta: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> (f64, f64) {
    let amount_out = constant_product_amount_out(delta, reserve_in, reserve_out, fee_bps);
    if amount_out.is_zero() || delta.is_zero() {
        return (0.0, f64::INFINITY);
    }
    let rate = u256_to_f64(amount_out) / u256_to_f64(delta);
    if rate <= 0.0 {
        (0.0, f64::INFINITY)
    } else {
        (rate, -rate.ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_product_matches_v2_997_1000_fee() {
        // 30 bps fee == 0.30% == the teacher's hardcoded 997/1000.
        let amount_in = U256::from(1_000_000u64);
        let reserve_in = U256::from(100_000_000u64);
        let reserve_out = U256::from(200_000_000u64);
        let generalized = constant_product_amount_out(amount_in, reserve_in, reserve_out, 30);

        let amount_in_with_fee = amount_in * U256::from(997u64);
        let numerator = amount_in_with_fee * reserve_out;
        let denominator = reserve_in * U256::from(1000u64) + amount_in_with_fee;
        let teacher_formula = numerator / denominator;

        assert_eq!(generalized, teacher_formula);
    }

    #[test]
    fn test_zero_reserves_yield_infinite_weight() {
        let (rate, weight) = rate_and_weight(U256::from(1u64), U256::ZERO, U256::from(100u64), 30);
        assert_eq!(rate, 0.0);
        assert!(weight.is_infinite());
    }

    #[test]
    fn test_v3_virtual_reserves_reconstruct_spot_price_ratio() {
        let sqrt_price_x96 = U256::from(1u128) << 96; // price == 1.0
        let (r0, r1) = v3_virtual_reserves(sqrt_price_x96, 1_000_000_000_000u128);
        assert_eq!(r0, r1);
        assert_eq!(v3_spot_price(sqrt_price_x96), 1.0);
    }

    #[test]
    fn test_round_trip_cost_is_nonnegative() {
        // weight(A->B) + weight(B->A) >= 0 for any nonzero fee (§8 invariant).
        let reserve_a = U256::from(1_000_000u64);
        let reserve_b = U256::from(2_000_000u64);
        let delta = U256::from(1_000u64);
        let (_, w_ab) = rate_and_weight(delta, reserve_a, reserve_b, 30);
        let (_, w_ba) = rate_and_weight(delta, reserve_b, reserve_a, 30);
        assert!(w_ab + w_ba >= 0.0);
    }
}
