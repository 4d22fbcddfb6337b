//! Loyalty point ("rights") cost of a priced line.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, ProductId, TenantId};

/// What to do when the buyer's balance does not cover the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientRightsAction {
    BlockPurchase,
    PartialPayment,
    CashPayment,
}

impl InsufficientRightsAction {
    pub fn as_str(self) -> &'static str {
        match self {
            InsufficientRightsAction::BlockPurchase => "block_purchase",
            InsufficientRightsAction::PartialPayment => "partial_payment",
            InsufficientRightsAction::CashPayment => "cash_payment",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "block_purchase" => Ok(InsufficientRightsAction::BlockPurchase),
            "partial_payment" => Ok(InsufficientRightsAction::PartialPayment),
            "cash_payment" => Ok(InsufficientRightsAction::CashPayment),
            other => Err(DomainError::validation(format!("unknown insufficient_rights_action '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsRule {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    /// Points per currency unit of line total.
    pub consumption_rate: Decimal,
    pub insufficient_rights_action: InsufficientRightsAction,
}

impl RightsRule {
    pub fn validate(&self) -> DomainResult<()> {
        if self.consumption_rate <= Decimal::ZERO {
            return Err(DomainError::validation("consumption_rate must be positive"));
        }
        Ok(())
    }
}

/// How a line ends up being paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsSettlement {
    /// Fully covered by points.
    Rights,
    PartialPayment,
    CashPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsCharge {
    pub required_rights: Decimal,
    pub consumed_rights: Decimal,
    pub cash_payment: Decimal,
    pub action: RightsSettlement,
}

impl RightsCharge {
    /// Charge for a product without a rights rule: nothing consumed, nothing owed in cash here.
    pub fn none() -> Self {
        Self {
            required_rights: Decimal::ZERO,
            consumed_rights: Decimal::ZERO,
            cash_payment: Decimal::ZERO,
            action: RightsSettlement::Rights,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RightsConsumptionCalculator {
    points_per_currency_unit: Decimal,
}

impl RightsConsumptionCalculator {
    /// `points_per_currency_unit` converts a points shortfall back into cash.
    pub fn new(points_per_currency_unit: Decimal) -> DomainResult<Self> {
        if points_per_currency_unit <= Decimal::ZERO {
            return Err(DomainError::validation("points_per_currency_unit must be positive"));
        }
        Ok(Self { points_per_currency_unit })
    }

    pub fn points_per_currency_unit(&self) -> Decimal {
        self.points_per_currency_unit
    }

    pub fn calculate(
        &self,
        effective_price: Decimal,
        quantity: i64,
        rule: &RightsRule,
        available_rights: Decimal,
    ) -> DomainResult<RightsCharge> {
        rule.validate()?;
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if effective_price < Decimal::ZERO {
            return Err(DomainError::validation("effective price cannot be negative"));
        }

        let line_total = effective_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| DomainError::validation("line total overflows"))?;
        let required = line_total
            .checked_mul(rule.consumption_rate)
            .ok_or_else(|| DomainError::validation("rights requirement overflows"))?
            .round_dp(2);
        let available = available_rights.max(Decimal::ZERO);

        if available >= required {
            return Ok(RightsCharge {
                required_rights: required,
                consumed_rights: required,
                cash_payment: Decimal::ZERO,
                action: RightsSettlement::Rights,
            });
        }

        match rule.insufficient_rights_action {
            InsufficientRightsAction::BlockPurchase => Err(DomainError::RightsInsufficient {
                required,
                available,
            }),
            InsufficientRightsAction::PartialPayment => {
                let shortfall = required - available;
                let cash = shortfall
                    .checked_div(self.points_per_currency_unit)
                    .ok_or_else(|| DomainError::validation("cash conversion overflows"))?;
                Ok(RightsCharge {
                    required_rights: required,
                    consumed_rights: available,
                    cash_payment: round_cash(cash),
                    action: RightsSettlement::PartialPayment,
                })
            }
            InsufficientRightsAction::CashPayment => Ok(RightsCharge {
                required_rights: required,
                consumed_rights: Decimal::ZERO,
                cash_payment: round_cash(line_total),
                action: RightsSettlement::CashPayment,
            }),
        }
    }
}

fn round_cash(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule(action: InsufficientRightsAction) -> RightsRule {
        RightsRule {
            tenant_id: TenantId::new(),
            product_id: ProductId::new(),
            consumption_rate: dec!(10),
            insufficient_rights_action: action,
        }
    }

    fn calculator() -> RightsConsumptionCalculator {
        RightsConsumptionCalculator::new(dec!(100)).unwrap()
    }

    #[test]
    fn sufficient_balance_pays_in_rights() {
        let charge = calculator()
            .calculate(dec!(12.50), 2, &rule(InsufficientRightsAction::BlockPurchase), dec!(1000))
            .unwrap();
        assert_eq!(charge.required_rights, dec!(250));
        assert_eq!(charge.consumed_rights, dec!(250));
        assert_eq!(charge.cash_payment, Decimal::ZERO);
        assert_eq!(charge.action, RightsSettlement::Rights);
    }

    #[test]
    fn block_purchase_reports_required_and_available() {
        let err = calculator()
            .calculate(dec!(10), 3, &rule(InsufficientRightsAction::BlockPurchase), dec!(120))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::RightsInsufficient {
                required: dec!(300),
                available: dec!(120),
            }
        );
    }

    #[test]
    fn partial_payment_converts_shortfall_to_cash() {
        let charge = calculator()
            .calculate(dec!(10), 3, &rule(InsufficientRightsAction::PartialPayment), dec!(125))
            .unwrap();
        assert_eq!(charge.consumed_rights, dec!(125));
        // (300 - 125) / 100
        assert_eq!(charge.cash_payment, dec!(1.75));
        assert_eq!(charge.action, RightsSettlement::PartialPayment);
    }

    #[test]
    fn cash_payment_consumes_no_rights() {
        let charge = calculator()
            .calculate(dec!(19.99), 3, &rule(InsufficientRightsAction::CashPayment), dec!(5))
            .unwrap();
        assert_eq!(charge.consumed_rights, Decimal::ZERO);
        assert_eq!(charge.cash_payment, dec!(59.97));
        assert_eq!(charge.action, RightsSettlement::CashPayment);
    }

    #[test]
    fn negative_balance_is_treated_as_empty() {
        let charge = calculator()
            .calculate(dec!(1), 1, &rule(InsufficientRightsAction::PartialPayment), dec!(-40))
            .unwrap();
        assert_eq!(charge.consumed_rights, Decimal::ZERO);
        assert_eq!(charge.cash_payment, dec!(0.10));
    }

    #[test]
    fn cash_rounds_half_away_from_zero() {
        let calc = RightsConsumptionCalculator::new(dec!(1000)).unwrap();
        // shortfall 5 points / 1000 = 0.005 -> 0.01
        let charge = calc
            .calculate(dec!(0.5), 1, &rule(InsufficientRightsAction::PartialPayment), Decimal::ZERO)
            .unwrap();
        assert_eq!(charge.cash_payment, dec!(0.01));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(RightsConsumptionCalculator::new(Decimal::ZERO).is_err());
        let mut bad = rule(InsufficientRightsAction::CashPayment);
        bad.consumption_rate = Decimal::ZERO;
        assert!(calculator().calculate(dec!(1), 1, &bad, dec!(1)).is_err());
        assert!(calculator()
            .calculate(dec!(1), 0, &rule(InsufficientRightsAction::CashPayment), dec!(1))
            .is_err());
    }

    #[test]
    fn action_names_round_trip() {
        for action in [
            InsufficientRightsAction::BlockPurchase,
            InsufficientRightsAction::PartialPayment,
            InsufficientRightsAction::CashPayment,
        ] {
            assert_eq!(InsufficientRightsAction::parse(action.as_str()).unwrap(), action);
        }
    }
}
