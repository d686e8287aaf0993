use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Currencies accepted for alerts and price comparisons.
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["EUR", "USD", "GBP"];

pub fn is_supported_currency(code: &str) -> bool {
    SUPPORTED_CURRENCIES.contains(&code)
}

pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Parse a wire amount into a decimal without losing precision.
pub fn parse_amount(raw: &str) -> CoreResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| CoreError::InvalidFormat(format!("amount '{}': {}", raw, e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self { amount, currency: currency.into() }
    }

    pub fn parse(amount: &str, currency: &str) -> CoreResult<Self> {
        if !is_currency_code(currency) {
            return Err(CoreError::InvalidFormat(format!("currency '{}'", currency)));
        }
        Ok(Self::new(parse_amount(amount)?, currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

pub fn currency_symbol(code: &str) -> Option<&'static str> {
    match code {
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "USD" => Some("$"),
        "JPY" => Some("¥"),
        "CHF" => Some("CHF "),
        "SEK" | "NOK" | "DKK" => Some("kr "),
        "PLN" => Some("zł "),
        "CZK" => Some("Kč "),
        "HUF" => Some("Ft "),
        "TRY" => Some("₺"),
        _ => None,
    }
}

/// Render an amount with the currency's symbol, or its code when unknown.
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let rendered = amount.normalize().to_string();
    match currency_symbol(currency) {
        Some(symbol) => format!("{}{}", symbol, rendered),
        None => format!("{} {}", rendered, currency),
    }
}
