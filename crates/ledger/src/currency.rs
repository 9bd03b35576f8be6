use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// ISO-like currency code attached to every stored amount.
///
/// budget_zen is effectively mono-currency per install (default `USD`), but
/// the ledger models currency explicitly so mixed records are rejected
/// instead of silently summed.
///
/// ## Minor units
///
/// All monetary values are stored as an `i64` number of **minor units** (see
/// `Money`). `minor_units()` returns the number of fraction digits used when
/// converting between major units (human input, e.g. `10.50 USD`) and the
/// stored integers (e.g. `1050`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    /// Number of fraction digits used when formatting/parsing amounts.
    #[must_use]
    pub const fn minor_units(self) -> u8 {
        match self {
            Currency::Usd | Currency::Eur | Currency::Gbp => 2,
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            other => Err(LedgerError::CurrencyMismatch(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}
