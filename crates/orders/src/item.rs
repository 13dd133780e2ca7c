use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use carefleet_assets::AssetId;
use carefleet_core::{BranchId, DomainError};
use carefleet_products::ProductId;

use crate::pricing;

/// One demand line of an order.
///
/// `assigned_assets` is ordered and never longer than `quantity`. Service
/// lines (`product_id == None`) carry no assignments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub branch_id: Option<BranchId>,
    pub quantity: u32,
    /// Rate per unit in minor currency units.
    pub rate: u64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub assigned_assets: Vec<AssetId>,
    pub auto_assigned: bool,
}

impl OrderItem {
    pub fn is_fully_assigned(&self) -> bool {
        self.quantity > 0 && self.assigned_assets.len() >= self.quantity as usize
    }

    pub fn remaining_capacity(&self) -> usize {
        (self.quantity as usize).saturating_sub(self.assigned_assets.len())
    }

    pub fn amount(&self) -> u64 {
        pricing::line_amount(self.quantity, self.rate)
    }

    pub fn holds(&self, asset_id: AssetId) -> bool {
        self.assigned_assets.contains(&asset_id)
    }

    pub fn is_service_line(&self) -> bool {
        self.product_id.is_none()
    }

    /// Shape checks that only need the line itself.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity == 0 {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be at least 1",
                self.line_no
            )));
        }
        if self.assigned_assets.len() > self.quantity as usize {
            return Err(DomainError::validation(format!(
                "line {}: {} assets assigned to quantity {}",
                self.line_no,
                self.assigned_assets.len(),
                self.quantity
            )));
        }
        if self.is_service_line() && !self.assigned_assets.is_empty() {
            return Err(DomainError::validation(format!(
                "line {}: service lines cannot hold assets",
                self.line_no
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(DomainError::validation(format!(
                    "line {}: start date {start} is after end date {end}",
                    self.line_no
                )));
            }
        }
        for (i, id) in self.assigned_assets.iter().enumerate() {
            if self.assigned_assets[..i].contains(id) {
                return Err(DomainError::validation(format!(
                    "line {}: asset {id} assigned twice",
                    self.line_no
                )));
            }
        }
        Ok(())
    }

    /// Compute the edited line and the asset ids it no longer holds.
    ///
    /// A product swap drops every assignment; shrinking the quantity drops
    /// the trailing assignments beyond the new quantity.
    pub fn with_changes(&self, changes: &ItemChanges) -> Result<(OrderItem, Vec<AssetId>), DomainError> {
        let mut next = self.clone();
        let mut released = Vec::new();

        if let Some(product_id) = changes.product_id {
            if Some(product_id) != self.product_id {
                next.product_id = Some(product_id);
                released.append(&mut next.assigned_assets);
                next.auto_assigned = false;
            }
        }
        if let Some(branch_id) = changes.branch_id {
            next.branch_id = Some(branch_id);
        }
        if let Some(quantity) = changes.quantity {
            next.quantity = quantity;
            if next.assigned_assets.len() > quantity as usize {
                released.extend(next.assigned_assets.split_off(quantity as usize));
            }
        }
        if let Some(rate) = changes.rate {
            next.rate = rate;
        }
        if let Some(start) = changes.start_date {
            next.start_date = Some(start);
        }
        if let Some(end) = changes.end_date {
            next.end_date = Some(end);
        }

        next.validate()?;
        Ok((next, released))
    }
}

/// Input for a new line. The line number is allocated by the order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub product_id: Option<ProductId>,
    pub branch_id: Option<BranchId>,
    pub quantity: u32,
    pub rate: u64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub assigned_assets: Vec<AssetId>,
    pub auto_assigned: bool,
}

impl NewItem {
    pub fn product(product_id: ProductId, quantity: u32, rate: u64) -> Self {
        Self {
            product_id: Some(product_id),
            quantity,
            rate,
            ..Self::default()
        }
    }

    pub fn service(quantity: u32, rate: u64) -> Self {
        Self {
            quantity,
            rate,
            ..Self::default()
        }
    }

    pub fn at_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_assets(mut self, assets: Vec<AssetId>) -> Self {
        self.assigned_assets = assets;
        self
    }

    pub fn into_item(self, line_no: u32) -> OrderItem {
        OrderItem {
            line_no,
            product_id: self.product_id,
            branch_id: self.branch_id,
            quantity: self.quantity,
            rate: self.rate,
            start_date: self.start_date,
            end_date: self.end_date,
            assigned_assets: self.assigned_assets,
            auto_assigned: self.auto_assigned,
        }
    }
}

/// Partial edit of a line. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemChanges {
    pub product_id: Option<ProductId>,
    pub branch_id: Option<BranchId>,
    pub quantity: Option<u32>,
    pub rate: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use carefleet_core::AggregateId;

    fn asset() -> AssetId {
        AssetId::new(AggregateId::new())
    }

    fn product() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn line(quantity: u32, assets: Vec<AssetId>) -> OrderItem {
        NewItem::product(product(), quantity, 100)
            .with_assets(assets)
            .into_item(1)
    }

    #[test]
    fn fully_assigned_needs_positive_quantity() {
        assert!(!line(0, vec![]).is_fully_assigned());
        assert!(!line(2, vec![asset()]).is_fully_assigned());
        assert!(line(2, vec![asset(), asset()]).is_fully_assigned());
    }

    #[test]
    fn product_swap_clears_assignment() {
        let item = line(2, vec![asset(), asset()]);
        let before = item.assigned_assets.clone();

        let (next, released) = item
            .with_changes(&ItemChanges {
                product_id: Some(product()),
                ..ItemChanges::default()
            })
            .unwrap();

        assert!(next.assigned_assets.is_empty());
        assert_eq!(released, before);
    }

    #[test]
    fn same_product_keeps_assignment() {
        let item = line(1, vec![asset()]);
        let (next, released) = item
            .with_changes(&ItemChanges {
                product_id: item.product_id,
                rate: Some(250),
                ..ItemChanges::default()
            })
            .unwrap();
        assert_eq!(next.assigned_assets, item.assigned_assets);
        assert!(released.is_empty());
        assert_eq!(next.amount(), 250);
    }

    #[test]
    fn shrinking_quantity_releases_the_tail() {
        let (a, b, c) = (asset(), asset(), asset());
        let item = line(3, vec![a, b, c]);
        let (next, released) = item
            .with_changes(&ItemChanges {
                quantity: Some(1),
                ..ItemChanges::default()
            })
            .unwrap();
        assert_eq!(next.assigned_assets, vec![a]);
        assert_eq!(released, vec![b, c]);
    }

    #[test]
    fn zero_quantity_and_reversed_dates_are_rejected() {
        let item = line(1, vec![]);
        assert!(item
            .with_changes(&ItemChanges {
                quantity: Some(0),
                ..ItemChanges::default()
            })
            .is_err());

        let err = item
            .with_changes(&ItemChanges {
                start_date: NaiveDate::from_ymd_opt(2025, 3, 10),
                end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
                ..ItemChanges::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_assignment_within_line_is_rejected() {
        let a = asset();
        assert!(line(2, vec![a, a]).validate().is_err());
    }
}
