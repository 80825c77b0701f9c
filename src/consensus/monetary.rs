use crate::config::ChainParams;
use serde::{Deserialize, Serialize};

/// The issuance schedule: geometric halving with a hard supply cap.
///
/// The cap is enforced against the running minted total carried in chain
/// state, not recomputed from height, so a schedule bug can never mint
/// past the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryPolicy {
    pub initial_subsidy: u64,
    pub halving_interval: u64,
    pub max_supply: u64,
}

impl MonetaryPolicy {
    pub fn new(initial_subsidy: u64, halving_interval: u64, max_supply: u64) -> Self {
        Self {
            initial_subsidy,
            halving_interval,
            max_supply,
        }
    }

    pub fn from_params(params: &ChainParams) -> Self {
        Self::new(
            params.initial_subsidy,
            params.halving_interval,
            params.max_supply,
        )
    }

    /// Scheduled subsidy at `height`: the initial subsidy halved once per
    /// completed era, zero from era 64 on.
    pub fn subsidy_at(&self, height: u64) -> u64 {
        let era = height / self.halving_interval;
        if era >= 64 {
            return 0;
        }
        self.initial_subsidy >> era
    }

    /// Subsidy actually mintable at `height` given how much has been
    /// minted so far. Truncates the final emission so the cap holds under
    /// any block sequence.
    pub fn allowed_subsidy(&self, height: u64, minted: u64) -> u64 {
        let scheduled = self.subsidy_at(height);
        let remaining = self.max_supply.saturating_sub(minted);
        scheduled.min(remaining)
    }

    /// Upper bound on a coinbase payout: allowed subsidy plus the fees the
    /// block collects.
    pub fn max_coinbase_value(&self, height: u64, minted: u64, fees: u64) -> u64 {
        self.allowed_subsidy(height, minted).saturating_add(fees)
    }

    pub fn era(&self, height: u64) -> u64 {
        height / self.halving_interval
    }

    pub fn next_halving_height(&self, height: u64) -> u64 {
        (self.era(height) + 1) * self.halving_interval
    }

    /// Supply the schedule would have emitted by `height` (exclusive),
    /// ignoring fees. Used for audits and reports, never for enforcement.
    pub fn expected_supply_at(&self, height: u64) -> u64 {
        let mut total: u64 = 0;
        let mut processed: u64 = 0;

        while processed < height {
            let reward = self.subsidy_at(processed);
            if reward == 0 {
                break;
            }
            let era_end = self.next_halving_height(processed).min(height);
            let blocks = era_end - processed;
            total = total.saturating_add(reward.saturating_mul(blocks));
            processed = era_end;
        }

        total.min(self.max_supply)
    }

    /// Asymptote of the schedule: the geometric series sums to just under
    /// twice one era's emission.
    pub fn theoretical_emission(&self) -> u64 {
        let mut total: u64 = 0;
        for era in 0..64 {
            let reward = self.initial_subsidy >> era;
            if reward == 0 {
                break;
            }
            total = total.saturating_add(reward.saturating_mul(self.halving_interval));
        }
        total
    }
}

/// Read-only economics summary exposed to collaborators. Every figure is
/// derived from the one policy record the engine enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsInfo {
    pub height: u64,
    pub current_subsidy: u64,
    pub total_supply: u64,
    pub max_supply: u64,
    pub remaining_supply: u64,
    pub era: u64,
    pub next_halving_height: u64,
    pub halving_interval: u64,
    pub target_block_interval: u64,
}

/// Display helper: sats rendered as a decimal QTC amount.
pub fn format_qtc(sats: u64) -> String {
    format!("{}.{:08}", sats / 100_000_000, sats % 100_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mainnet_policy() -> MonetaryPolicy {
        MonetaryPolicy::new(50_00000000, 105_120, 22_000_000_00000000)
    }

    #[test]
    fn test_subsidy_halving_schedule() {
        let policy = mainnet_policy();

        assert_eq!(policy.subsidy_at(0), 50_00000000);
        assert_eq!(policy.subsidy_at(105_119), 50_00000000);
        assert_eq!(policy.subsidy_at(105_120), 25_00000000);
        assert_eq!(policy.subsidy_at(210_240), 12_50000000);
        assert_eq!(policy.subsidy_at(64 * 105_120), 0);
    }

    #[test]
    fn test_total_emission_stays_under_cap() {
        let policy = mainnet_policy();
        let mut total: u128 = 0;

        for era in 0..64u64 {
            let subsidy = policy.subsidy_at(era * policy.halving_interval);
            total += subsidy as u128 * policy.halving_interval as u128;
            if subsidy == 0 {
                break;
            }
        }

        assert!(total <= policy.max_supply as u128);
        assert_eq!(total, policy.theoretical_emission() as u128);
    }

    #[test]
    fn test_allowed_subsidy_clamps_at_cap() {
        let policy = mainnet_policy();

        assert_eq!(policy.allowed_subsidy(0, 0), 50_00000000);

        // One sat short of the cap leaves exactly one sat mintable.
        let nearly_full = policy.max_supply - 1;
        assert_eq!(policy.allowed_subsidy(0, nearly_full), 1);
        assert_eq!(policy.allowed_subsidy(0, policy.max_supply), 0);
    }

    #[test]
    fn test_max_coinbase_includes_fees() {
        let policy = mainnet_policy();

        assert_eq!(policy.max_coinbase_value(0, 0, 1_500), 50_00000000 + 1_500);
        // At the cap only fees remain claimable.
        assert_eq!(policy.max_coinbase_value(0, policy.max_supply, 1_500), 1_500);
    }

    #[test]
    fn test_expected_supply_monotone_and_era_aligned() {
        let policy = MonetaryPolicy::new(50_00000000, 150, 22_000_000_00000000);

        assert_eq!(policy.expected_supply_at(0), 0);
        assert_eq!(policy.expected_supply_at(1), 50_00000000);
        assert_eq!(policy.expected_supply_at(150), 150 * 50_00000000);
        // First post-halving block adds the halved reward.
        assert_eq!(
            policy.expected_supply_at(151),
            150 * 50_00000000 + 25_00000000
        );

        let mut prev = 0;
        for height in 0..500 {
            let supply = policy.expected_supply_at(height);
            assert!(supply >= prev);
            prev = supply;
        }
    }

    #[test]
    fn test_era_and_next_halving() {
        let policy = mainnet_policy();

        assert_eq!(policy.era(0), 0);
        assert_eq!(policy.era(105_120), 1);
        assert_eq!(policy.next_halving_height(0), 105_120);
        assert_eq!(policy.next_halving_height(105_120), 210_240);
    }

    #[test]
    fn test_format_qtc() {
        assert_eq!(format_qtc(50_00000000), "50.00000000");
        assert_eq!(format_qtc(546), "0.00000546");
        assert_eq!(format_qtc(22_000_000_00000000), "22000000.00000000");
    }
}
