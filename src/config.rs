//! Runtime settings for the marketplace core.
//!
//! The binary collects raw values from flags and `AUTOMARKET_*` environment
//! variables; [`MarketConfig::from_settings`] validates them once at startup.

use crate::domain::money::{CommissionRate, Currency};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid {name}: {value} (expected a rate in [0, 1))")]
    InvalidRate { name: &'static str, value: Decimal },

    #[error("invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Unvalidated settings as they arrive from the command line or environment.
#[derive(Debug, Clone)]
pub struct RawSettings {
    pub commission_rate: Decimal,
    pub currency: String,
    pub vat_rate: Decimal,
    pub gateway_timeout_ms: u64,
    pub reservation_lease_secs: u64,
    pub seller_receipts: bool,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            commission_rate: dec!(0.05),
            currency: "eur".to_string(),
            vat_rate: Decimal::ZERO,
            gateway_timeout_ms: 10_000,
            reservation_lease_secs: 300,
            seller_receipts: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Platform cut taken from every captured payment.
    pub commission_rate: CommissionRate,
    pub currency: Currency,
    /// VAT applied on top of the gross amount in buyer invoices.
    pub vat_rate: Decimal,
    /// Upper bound for a single payment processor call.
    pub gateway_timeout: Duration,
    /// How long an in-flight ledger reservation blocks other callers.
    pub reservation_lease: Duration,
    /// Whether invoice generation also renders the expert's receipt.
    pub seller_receipts: bool,
}

impl MarketConfig {
    pub fn from_settings(raw: RawSettings) -> Result<Self, ConfigError> {
        let commission_rate =
            CommissionRate::new(raw.commission_rate).map_err(|_| ConfigError::InvalidRate {
                name: "commission rate",
                value: raw.commission_rate,
            })?;
        if raw.vat_rate < Decimal::ZERO || raw.vat_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidRate {
                name: "VAT rate",
                value: raw.vat_rate,
            });
        }
        let currency = Currency::new(&raw.currency)
            .map_err(|_| ConfigError::InvalidCurrency(raw.currency.clone()))?;
        if raw.gateway_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "gateway timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            commission_rate,
            currency,
            vat_rate: raw.vat_rate,
            gateway_timeout: Duration::from_millis(raw.gateway_timeout_ms),
            reservation_lease: Duration::from_secs(raw.reservation_lease_secs),
            seller_receipts: raw.seller_receipts,
        })
    }

    /// The reservation lease as a calendar duration, for comparing timestamps.
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reservation_lease).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            commission_rate: CommissionRate::STANDARD,
            currency: Currency::eur(),
            vat_rate: Decimal::ZERO,
            gateway_timeout: Duration::from_secs(10),
            reservation_lease: Duration::from_secs(300),
            seller_receipts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MarketConfig::from_settings(RawSettings::default()).unwrap();
        assert_eq!(config.commission_rate.value(), dec!(0.05));
        assert_eq!(config.currency, Currency::eur());
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.lease(), chrono::Duration::seconds(300));
        assert!(config.seller_receipts);
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        let raw = RawSettings {
            commission_rate: dec!(1.5),
            ..Default::default()
        };
        assert!(matches!(
            MarketConfig::from_settings(raw),
            Err(ConfigError::InvalidRate { name: "commission rate", .. })
        ));

        let raw = RawSettings {
            vat_rate: dec!(-0.21),
            ..Default::default()
        };
        assert!(matches!(
            MarketConfig::from_settings(raw),
            Err(ConfigError::InvalidRate { name: "VAT rate", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_currency_and_timeout() {
        let raw = RawSettings {
            currency: "euro".to_string(),
            ..Default::default()
        };
        assert_eq!(
            MarketConfig::from_settings(raw).unwrap_err(),
            ConfigError::InvalidCurrency("euro".to_string())
        );

        let raw = RawSettings {
            gateway_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            MarketConfig::from_settings(raw),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
