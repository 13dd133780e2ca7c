//! Order pricing. Pure integer arithmetic in minor currency units.
//!
//! Assignment state never enters here: the amount of a line is
//! `quantity × rate` whether or not its units are assigned.

use serde::{Deserialize, Serialize};

use carefleet_core::DomainError;

use crate::item::OrderItem;

const BPS_SCALE: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    /// Basis points of the subtotal (`1_000` = 10%).
    Percent(u32),
    /// Flat amount in minor units.
    Flat(u64),
}

impl Discount {
    pub fn validate(self) -> Result<(), DomainError> {
        match self {
            Discount::Percent(bps) if u64::from(bps) > BPS_SCALE => Err(DomainError::validation(
                format!("discount {bps} bps exceeds 100%"),
            )),
            _ => Ok(()),
        }
    }

    /// Discount amount for `subtotal`, never more than the subtotal.
    pub fn amount(self, subtotal: u64) -> u64 {
        let raw = match self {
            Discount::None => 0,
            Discount::Percent(bps) => mul_bps_half_up(subtotal, u64::from(bps)),
            Discount::Flat(amount) => amount,
        };
        raw.min(subtotal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: u64,
    pub discount: u64,
    pub tax: u64,
    pub total: u64,
}

pub fn line_amount(quantity: u32, rate: u64) -> u64 {
    u64::from(quantity).saturating_mul(rate)
}

pub fn compute(items: &[OrderItem], discount: Discount, tax_bps: u32) -> Totals {
    let subtotal = items
        .iter()
        .map(|i| line_amount(i.quantity, i.rate))
        .fold(0u64, u64::saturating_add);
    let discount = discount.amount(subtotal);
    let taxable = subtotal - discount;
    let tax = mul_bps_half_up(taxable, u64::from(tax_bps));

    Totals {
        subtotal,
        discount,
        tax,
        total: taxable.saturating_add(tax),
    }
}

fn mul_bps_half_up(base: u64, bps: u64) -> u64 {
    let scaled = u128::from(base) * u128::from(bps) + u128::from(BPS_SCALE / 2);
    u64::try_from(scaled / u128::from(BPS_SCALE)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, rate: u64) -> OrderItem {
        OrderItem {
            quantity,
            rate,
            ..OrderItem::default()
        }
    }

    #[test]
    fn totals_follow_quantity_and_rate() {
        let items = vec![item(2, 1_500), item(1, 700)];
        let totals = compute(&items, Discount::None, 0);
        assert_eq!(totals.subtotal, 3_700);
        assert_eq!(totals.total, 3_700);
    }

    #[test]
    fn percent_discount_then_tax_rounds_half_up() {
        // subtotal 1_005, 10% off = 100.5 -> 101, taxable 904, 5% = 45.2 -> 45
        let totals = compute(&[item(1, 1_005)], Discount::Percent(1_000), 500);
        assert_eq!(totals.discount, 101);
        assert_eq!(totals.tax, 45);
        assert_eq!(totals.total, 949);
    }

    #[test]
    fn flat_discount_is_capped_at_subtotal() {
        let totals = compute(&[item(1, 300)], Discount::Flat(1_000), 1_800);
        assert_eq!(totals.discount, 300);
        assert_eq!(totals.tax, 0);
        assert_eq!(totals.total, 0);
    }

    #[test]
    fn percent_over_hundred_is_rejected() {
        assert!(Discount::Percent(10_001).validate().is_err());
        assert!(Discount::Percent(10_000).validate().is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: total == subtotal - discount + tax, discount never exceeds subtotal.
            #[test]
            fn totals_are_consistent(
                lines in prop::collection::vec((0u32..50, 0u64..1_000_000), 0..8),
                flat in 0u64..10_000_000,
                pct in 0u32..=10_000,
                use_pct in any::<bool>(),
                tax_bps in 0u32..5_000
            ) {
                let items: Vec<OrderItem> = lines.into_iter().map(|(q, r)| item(q, r)).collect();
                let discount = if use_pct { Discount::Percent(pct) } else { Discount::Flat(flat) };
                let t = compute(&items, discount, tax_bps);

                prop_assert!(t.discount <= t.subtotal);
                prop_assert_eq!(t.total, t.subtotal - t.discount + t.tax);
            }
        }
    }
}
