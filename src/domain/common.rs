//! Aggregates shared across OFX message sets.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::meta::{impl_aggregate, RegistryBuilder};

/// Severity of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Map a wire token, tolerating unknown values.
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "INFO" => Some(Severity::Info),
            "WARN" => Some(Severity::Warn),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }
}

/// Transaction status (`STATUS`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Status {
    pub code: Option<i32>,
    pub severity: Option<String>,
    pub message: Option<String>,
}

impl Status {
    pub fn severity_enum(&self) -> Option<Severity> {
        self.severity.as_deref().and_then(Severity::from_ofx)
    }

    /// Code `0` is the conventional success status.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Original (pre-conversion) currency of an amount (`ORIGCURRENCY`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct OriginalCurrencyInfo {
    pub currency_rate: Option<Decimal>,
    pub currency_code: Option<String>,
}

impl_aggregate!(Status, OriginalCurrencyInfo);

pub(crate) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .aggregate::<Status>("STATUS")?
        .integer("CODE", 0, true, |s| s.code, |s, v| s.code = Some(v))
        .string(
            "SEVERITY",
            10,
            true,
            |s| s.severity.clone(),
            |s, v| s.severity = Some(v),
        )
        .string(
            "MESSAGE",
            20,
            false,
            |s| s.message.clone(),
            |s, v| s.message = Some(v),
        );

    builder
        .aggregate::<OriginalCurrencyInfo>("ORIGCURRENCY")?
        .decimal(
            "CURRATE",
            10,
            true,
            |c| c.currency_rate,
            |c, v| c.currency_rate = Some(v),
        )
        .string(
            "CURSYM",
            20,
            true,
            |c| c.currency_code.clone(),
            |c, v| c.currency_code = Some(v),
        );

    Ok(())
}
