//! Centralized Contract Definitions
//!
//! All Solidity contract interfaces used by the arbitrage engine, defined
//! with alloy's `sol!` macro. Each interface is annotated with
//! `#[sol(rpc)]` to generate contract instance types that can make RPC
//! calls through any alloy `Provider`.
//!
//! Author: AI-Generated
//! Created: 2026-02-01
//! Modified: 2026-07-28 — generalized ArbExecutor to the N-leg
//! flashloan-callback signature; added Multicall3 for pre-flight batch
//! quoting.

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

// ── v2-family (Uniswap V2 / forks) ──────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
        function allPairsLength() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface IV2Pool {
        event Sync(uint112 reserve0, uint112 reserve1);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

// ── v3-family (Uniswap V3 / forks) ──────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }
}

sol! {
    #[sol(rpc)]
    interface IV3Pool {
        event Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick);
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
        function liquidity() external view returns (uint128);
        function fee() external view returns (uint24);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }
}

// ── Multicall3 (batch pre-flight quoting, §4.7 step 1) ──────────────

sol! {
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }
}

// ── Arbitrage contract (external collaborator, §4.8) ─────────────────
//
// `executeArbitrage((address,uint256,(address,address,address,uint256,bytes,uint8)[],uint256))`
// Flashloans `flashAmount` of `flashToken`, applies `swaps` in order in its
// own address, verifies `balance(flashToken) - flashAmount >= minProfit`,
// repays the flashloan, and reverts otherwise. This crate only needs the
// fixed entry point; the contract's implementation is out of scope.

sol! {
    #[sol(rpc)]
    struct SwapStep {
        address router;
        address tokenIn;
        address tokenOut;
        uint256 amountIn;
        bytes data;
        uint8 dexType;
    }

    struct ArbitrageParams {
        address flashToken;
        uint256 flashAmount;
        SwapStep[] swaps;
        uint256 minProfit;
    }

    #[sol(rpc)]
    interface IArbitrageExecutor {
        function executeArbitrage(ArbitrageParams calldata params) external returns (uint256 profit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, U256};

    #[test]
    fn test_swap_step_encodes_v2_leg_with_empty_data() {
        let step = SwapStep {
            router: Address::ZERO,
            tokenIn: Address::ZERO,
            tokenOut: Address::ZERO,
            amountIn: U256::from(1_000u64),
            data: Bytes::new(),
            dexType: 0,
        };
        assert_eq!(step.dexType, 0);
        assert!(step.data.is_empty());
    }
}
