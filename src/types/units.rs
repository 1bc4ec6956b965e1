//! Unit Conversion Utilities
//!
//! Bitcoin amounts arrive from the node as BTC floats. The inner ledger counts
//! in units ten times finer than a satoshi.

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Inner-ledger units per satoshi
pub const INNER_UNITS_PER_SAT: u64 = 10;

/// Convert BTC to satoshis, rounding to the nearest satoshi
pub fn btc_to_sats(btc: f64) -> u64 {
    (btc * SATS_PER_BTC as f64).round() as u64
}

/// Convert a node-reported BTC amount to inner-ledger units
pub fn btc_to_inner_units(btc: f64) -> u64 {
    btc_to_sats(btc) * INNER_UNITS_PER_SAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_to_sats() {
        assert_eq!(btc_to_sats(0.0), 0);
        assert_eq!(btc_to_sats(0.00000001), 1);
        assert_eq!(btc_to_sats(1.0), 100_000_000);
        assert_eq!(btc_to_sats(0.5), 50_000_000);
    }

    #[test]
    fn test_rounding_not_truncation() {
        // 0.29 * 1e8 is 28999999.999999996 in f64
        assert_eq!(btc_to_sats(0.29), 29_000_000);
    }

    #[test]
    fn test_btc_to_inner_units() {
        assert_eq!(btc_to_inner_units(0.00000001), 10);
        assert_eq!(btc_to_inner_units(1.0), 1_000_000_000);
        assert_eq!(btc_to_inner_units(0.001), 1_000_000);
    }
}
