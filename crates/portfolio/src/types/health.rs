use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{CAUTION_HF, GOOD_HF, HEALTHY_HF};

/// Account health factor.
///
/// `NoDebt` replaces the division by zero an account without borrows would
/// otherwise produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum HealthFactor {
    NoDebt,
    Value(#[serde(with = "rust_decimal::serde::str")] Decimal),
}

impl HealthFactor {
    /// Collateral-over-debt ratio; `NoDebt` when `borrow_usd` is zero.
    /// A ratio beyond `Decimal` range saturates.
    pub fn from_ratio(supply_usd: Decimal, borrow_usd: Decimal) -> Self {
        if borrow_usd.is_zero() {
            return Self::NoDebt;
        }
        let ratio = supply_usd.checked_div(borrow_usd).unwrap_or(
            if supply_usd.is_sign_negative() == borrow_usd.is_sign_negative() {
                Decimal::MAX
            } else {
                Decimal::ZERO
            },
        );
        Self::Value(ratio.max(Decimal::ZERO))
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::NoDebt => None,
            Self::Value(v) => Some(*v),
        }
    }

    pub fn is_no_debt(&self) -> bool {
        matches!(self, Self::NoDebt)
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_health_factor(self)
    }
}

/// Coarse risk bucket for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// HF >= 3.0, or no debt.
    Healthy,
    /// 1.5 <= HF < 3.0
    Good,
    /// 1.1 <= HF < 1.5
    Caution,
    /// HF < 1.1
    AtRisk,
}

impl HealthStatus {
    pub fn from_health_factor(hf: &HealthFactor) -> Self {
        match hf {
            HealthFactor::NoDebt => Self::Healthy,
            HealthFactor::Value(v) if *v >= HEALTHY_HF => Self::Healthy,
            HealthFactor::Value(v) if *v >= GOOD_HF => Self::Good,
            HealthFactor::Value(v) if *v >= CAUTION_HF => Self::Caution,
            HealthFactor::Value(_) => Self::AtRisk,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Good => "Good",
            Self::Caution => "Caution",
            Self::AtRisk => "At Risk",
        }
    }
}
