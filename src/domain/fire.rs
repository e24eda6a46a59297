//! Financial-independence projection.
//!
//! The target nest egg is annual expenses divided by the safe withdrawal
//! rate. Years to reach it solve `net_worth * (1 + apr)^years = target` for
//! `years`, so `years = ln(target / net_worth) / ln(1 + apr)`.

use tracing::info;

use super::error::FireError;
use super::user::UserId;
use crate::ports::store_port::LedgerStore;

pub const DEFAULT_SWR: f64 = 4.0;
pub const DEFAULT_APR: f64 = 7.0;

/// Inputs in currency units and percentages (`swr = 4.0` means 4%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireInputs {
    pub income: f64,
    pub expenses: f64,
    pub savings_rate: f64,
    pub net_worth: f64,
    pub swr: f64,
    pub apr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FireProjection {
    pub fire_number: Option<f64>,
    pub years_to_fire: Option<f64>,
}

impl FireInputs {
    pub fn validate(&self) -> Result<(), FireError> {
        let fields = [
            ("income", self.income),
            ("expenses", self.expenses),
            ("savings rate", self.savings_rate),
            ("net worth", self.net_worth),
            ("safe withdrawal rate", self.swr),
            ("annual return", self.apr),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(FireError::invalid_input(field, "must be a finite number"));
            }
        }
        for (field, value) in [
            ("income", self.income),
            ("expenses", self.expenses),
            ("safe withdrawal rate", self.swr),
        ] {
            if value < 0.0 {
                return Err(FireError::invalid_input(field, "cannot be negative"));
            }
        }
        if !(0.0..=100.0).contains(&self.savings_rate) {
            return Err(FireError::invalid_input(
                "savings rate",
                "must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Pure projection. Undefined results are `None`, never errors.
pub fn compute(inputs: &FireInputs) -> FireProjection {
    let fire_number = if inputs.swr != 0.0 {
        Some(inputs.expenses / (inputs.swr / 100.0))
    } else {
        None
    };

    let years_to_fire = match fire_number {
        Some(target) if inputs.net_worth > 0.0 && inputs.apr > 0.0 => {
            let years = (target / inputs.net_worth).ln() / (1.0 + inputs.apr / 100.0).ln();
            (years.is_finite() && years > 0.0).then_some(years)
        }
        _ => None,
    };

    FireProjection {
        fire_number,
        years_to_fire,
    }
}

/// Validates, computes, and caches the projection on the user record.
pub fn project_and_save(
    store: &dyn LedgerStore,
    user: UserId,
    inputs: &FireInputs,
) -> Result<FireProjection, FireError> {
    inputs.validate()?;
    let projection = compute(inputs);
    store.save_projection(user, &projection)?;
    info!(
        user,
        fire_number = ?projection.fire_number,
        years_to_fire = ?projection.years_to_fire,
        "fire projection saved"
    );
    Ok(projection)
}
