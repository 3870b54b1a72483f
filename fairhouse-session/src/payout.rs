use fairhouse_core::Amount;

const BPS_DENOMINATOR: u128 = 10_000;

/// House edge and protocol fee, in basis points, as read from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HouseRates {
    pub edge_bps: u32,
    pub fee_bps: u32,
}

/// Display estimate of what `wager` returns after `steps` consecutive wins.
/// The ledger's payout rule is authoritative; this mirrors it for the UI.
///
/// `gross = wager * (1 + steps)`, less the house edge, less the fee taken
/// from what remains. Saturates at `u128::MAX` instead of overflowing.
pub fn projected_return(wager: Amount, steps: u32, rates: HouseRates) -> Amount {
    let multiplier = 1 + u128::from(steps);
    let keep = BPS_DENOMINATOR.saturating_sub(u128::from(rates.edge_bps));

    let Some(after_edge) = wager
        .mul_div(multiplier, 1)
        .and_then(|gross| gross.mul_div(keep, BPS_DENOMINATOR))
    else {
        return Amount::from_units(u128::MAX);
    };

    let fee = after_edge
        .mul_div(u128::from(rates.fee_bps), BPS_DENOMINATOR)
        .unwrap_or(after_edge);
    after_edge.saturating_sub(fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projected_return_applies_edge_then_fee() {
        let rates = HouseRates {
            edge_bps: 500,
            fee_bps: 100,
        };
        // 100 * 2 = 200, * 0.95 = 190, fee 1.9 rounds down to 1.
        assert_eq!(
            projected_return(Amount::from_units(100), 1, rates),
            Amount::from_units(189)
        );
        assert_eq!(
            projected_return(Amount::from_units(10), 1, HouseRates::default()),
            Amount::from_units(20)
        );
        assert_eq!(
            projected_return(Amount::from_units(10), 3, HouseRates::default()),
            Amount::from_units(40)
        );
    }

    #[test]
    fn test_full_edge_returns_nothing() {
        let rates = HouseRates {
            edge_bps: 10_000,
            fee_bps: 0,
        };
        assert_eq!(projected_return(Amount::from_units(100), 5, rates), Amount::ZERO);
    }
}
