//! Market constants.
//!
//! Every replica must run with the same values, so the binary only overrides them
//! from the environment for local replays and tests.

use rust_decimal::Decimal;

/// Name the market contract is registered under; escrow is held in its custody.
pub const CONTRACT_NAME: &str = "market";
/// Contract that owns the token registry and balances.
pub const TOKENS_CONTRACT: &str = "tokens";

/// Contract parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketConfig {
    /// Settlement token every price is denominated in.
    pub peg_symbol: String,
    /// Decimal places of the settlement token (and of every price).
    pub peg_precision: u32,
    /// Rows read per book page while matching or sweeping.
    pub page_size: usize,
    /// Longest lifetime an order may request, in seconds.
    pub max_expiration_secs: u64,
    /// Rolling window for volume, trade history and price change, in seconds.
    pub window_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            peg_symbol: "STEEMP".into(),
            peg_precision: 8,
            page_size: 1000,
            max_expiration_secs: 2_592_000,
            window_secs: 86_400,
        }
    }
}

impl MarketConfig {
    /// Defaults overridden by `MARKET_PEG_SYMBOL`, `MARKET_PEG_PRECISION`,
    /// `MARKET_PAGE_SIZE` and `MARKET_MAX_EXPIRATION_SECS` when set and parseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            peg_symbol: std::env::var("MARKET_PEG_SYMBOL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.peg_symbol),
            peg_precision: std::env::var("MARKET_PEG_PRECISION")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|p| *p <= 18)
                .unwrap_or(defaults.peg_precision),
            page_size: std::env::var("MARKET_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.page_size),
            max_expiration_secs: std::env::var("MARKET_MAX_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_expiration_secs),
            window_secs: defaults.window_secs,
        }
    }

    /// Smallest tradable settlement amount: one unit at the last peg decimal place.
    pub fn dust_threshold(&self) -> Decimal {
        Decimal::new(1, self.peg_precision)
    }

    /// Absolute expiration for an order created at `now` asking for `requested` seconds.
    /// Missing or over-long requests get the maximum lifetime.
    pub fn expiration_from(&self, now: u64, requested: Option<u64>) -> u64 {
        match requested {
            Some(secs) if secs <= self.max_expiration_secs => now + secs,
            _ => now + self.max_expiration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dust_threshold_is_one_unit_of_last_place() {
        let config = MarketConfig::default();
        assert_eq!(config.dust_threshold().to_string(), "0.00000001");
    }

    #[test]
    fn expiration_defaults_and_caps_at_thirty_days() {
        let config = MarketConfig::default();
        assert_eq!(config.expiration_from(100, None), 100 + 2_592_000);
        assert_eq!(config.expiration_from(100, Some(60)), 160);
        assert_eq!(config.expiration_from(100, Some(2_592_001)), 100 + 2_592_000);
    }
}
