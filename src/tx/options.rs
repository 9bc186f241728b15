//! Per-engine fee options, passed explicitly instead of read from global state.

use alloy::primitives::U256;

use crate::units::{AdjustmentFactor, WorkEstimate};

/// Fee policy applied by [`TxEngine`](crate::tx::TxEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    /// Skip the maximum-fee check.
    pub disable_fee_check: bool,

    /// Applied to network fee-rate estimates only, never to explicit fees.
    pub fee_adjustment_factor: AdjustmentFactor,

    /// Fee ceiling in base units.
    pub max_tx_fee: U256,

    /// Replaces the adapter's work estimate when set.
    pub gas_limit_override: Option<WorkEstimate>,
}

impl TxOptions {
    pub fn new(max_tx_fee: U256) -> Self {
        Self {
            disable_fee_check: false,
            fee_adjustment_factor: AdjustmentFactor::ONE,
            max_tx_fee,
            gas_limit_override: None,
        }
    }

    pub fn with_adjustment(mut self, factor: AdjustmentFactor) -> Self {
        self.fee_adjustment_factor = factor;
        self
    }

    pub fn with_gas_limit_override(mut self, work: WorkEstimate) -> Self {
        self.gas_limit_override = Some(work);
        self
    }

    pub fn without_fee_check(mut self) -> Self {
        self.disable_fee_check = true;
        self
    }
}
