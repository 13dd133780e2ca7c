use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use carefleet_core::ValueObject;

/// Asset status. Always exactly one of these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    InStock,
    OutForRental,
    Maintenance,
    Reserved,
}

impl AssetStatus {
    pub const ALL: [AssetStatus; 4] = [
        AssetStatus::InStock,
        AssetStatus::OutForRental,
        AssetStatus::Maintenance,
        AssetStatus::Reserved,
    ];

    /// Statuses that must carry a rental link.
    pub fn requires_rental(self) -> bool {
        matches!(self, AssetStatus::OutForRental | AssetStatus::Reserved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetStatus::InStock => "in_stock",
            AssetStatus::OutForRental => "out_for_rental",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::Reserved => "reserved",
        }
    }
}

impl core::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AssetStatus {
    type Err = carefleet_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| carefleet_core::DomainError::validation(format!("unknown asset status '{s}'")))
    }
}

/// Link from a held unit to the rental/reservation holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalLink {
    /// Order (or external rental) reference.
    pub rental_id: String,
    pub customer: String,
    pub until: Option<NaiveDate>,
}

impl RentalLink {
    pub fn new(rental_id: impl Into<String>, customer: impl Into<String>) -> Self {
        Self {
            rental_id: rental_id.into(),
            customer: customer.into(),
            until: None,
        }
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }
}

impl ValueObject for RentalLink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&AssetStatus::OutForRental).unwrap();
        assert_eq!(json, "\"out_for_rental\"");
        let back: AssetStatus = serde_json::from_str("\"in_stock\"").unwrap();
        assert_eq!(back, AssetStatus::InStock);
    }

    #[test]
    fn parse_matches_display() {
        for st in AssetStatus::ALL {
            assert_eq!(st.to_string().parse::<AssetStatus>().unwrap(), st);
        }
        assert!("lost".parse::<AssetStatus>().is_err());
    }

    #[test]
    fn only_held_statuses_require_a_rental_link() {
        assert!(AssetStatus::Reserved.requires_rental());
        assert!(AssetStatus::OutForRental.requires_rental());
        assert!(!AssetStatus::InStock.requires_rental());
        assert!(!AssetStatus::Maintenance.requires_rental());
    }
}
