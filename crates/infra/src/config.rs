//! Engine configuration.
//!
//! Loaded from TOML (every key optional), then overridden from the
//! environment:
//!
//! | variable | key |
//! |---|---|
//! | `CAREFLEET_RESERVATION_STATUS` | `reservation_status` (`reserved` / `out_for_rental`) |
//! | `CAREFLEET_COMPARE_AND_SWAP` | `compare_and_swap` (`true` / `false`) |
//! | `CAREFLEET_PRODUCT_SWAP` | `product_swap` (`release` / `unlink`) |
//! | `CAREFLEET_CODE_ATTEMPTS` | `code_attempts` |

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use carefleet_assets::AssetStatus;

use crate::error::{ServiceError, ServiceResult};

/// Ledger status given to units when they are assigned to an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Reserved,
    OutForRental,
}

impl ReservationStatus {
    pub fn asset_status(self) -> AssetStatus {
        match self {
            ReservationStatus::Reserved => AssetStatus::Reserved,
            ReservationStatus::OutForRental => AssetStatus::OutForRental,
        }
    }
}

/// What happens to units unlinked by a product change on an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSwapPolicy {
    /// Units still held for this order are checked back in.
    #[default]
    Release,
    /// Only the link is cleared; units keep their ledger status.
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reservation_status: ReservationStatus,
    /// Resolver writes use `set_status_if(in_stock, ..)` instead of a plain
    /// `set_status`.
    pub compare_and_swap: bool,
    pub product_swap: ProductSwapPolicy,
    /// Attempts at drawing an unused asset code before giving up.
    pub code_attempts: u32,
    /// Reload-and-retry rounds when a document write loses a version race.
    pub write_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_status: ReservationStatus::Reserved,
            compare_and_swap: true,
            product_swap: ProductSwapPolicy::Release,
            code_attempts: 8,
            write_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> ServiceResult<Self> {
        let config: EngineConfig = toml::from_str(contents)
            .map_err(|e| ServiceError::Config(format!("failed to parse engine config: {e}")))?;
        config.validate()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ServiceResult<Self> {
        let path_ref = path.as_ref();
        tracing::debug!(path = ?path_ref, "loading engine config");
        let contents = fs::read_to_string(path_ref).map_err(|e| {
            ServiceError::Config(format!("failed to read config file {path_ref:?}: {e}"))
        })?;
        Self::from_toml_str(&contents)?.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ServiceResult<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ServiceResult<Self> {
        if let Some(v) = lookup("CAREFLEET_RESERVATION_STATUS") {
            self.reservation_status = parse_enum("CAREFLEET_RESERVATION_STATUS", &v)?;
        }
        if let Some(v) = lookup("CAREFLEET_COMPARE_AND_SWAP") {
            self.compare_and_swap = v.trim().parse::<bool>().map_err(|_| {
                ServiceError::Config(format!("CAREFLEET_COMPARE_AND_SWAP: expected true/false, got '{v}'"))
            })?;
        }
        if let Some(v) = lookup("CAREFLEET_PRODUCT_SWAP") {
            self.product_swap = parse_enum("CAREFLEET_PRODUCT_SWAP", &v)?;
        }
        if let Some(v) = lookup("CAREFLEET_CODE_ATTEMPTS") {
            self.code_attempts = v.trim().parse::<u32>().map_err(|_| {
                ServiceError::Config(format!("CAREFLEET_CODE_ATTEMPTS: expected a number, got '{v}'"))
            })?;
        }
        self.validate()
    }

    fn validate(self) -> ServiceResult<Self> {
        if self.code_attempts == 0 {
            return Err(ServiceError::Config("code_attempts must be at least 1".to_string()));
        }
        Ok(self)
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> ServiceResult<T> {
    T::deserialize(serde_json::Value::String(raw.trim().to_string()))
        .map_err(|e| ServiceError::Config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_reserve_with_compare_and_swap() {
        let config = EngineConfig::default();
        assert_eq!(config.reservation_status.asset_status(), AssetStatus::Reserved);
        assert!(config.compare_and_swap);
        assert_eq!(config.product_swap, ProductSwapPolicy::Release);
    }

    #[test]
    fn toml_keys_are_optional() {
        let config = EngineConfig::from_toml_str(
            r#"
            reservation_status = "out_for_rental"
            product_swap = "unlink"
            "#,
        )
        .unwrap();
        assert_eq!(config.reservation_status, ReservationStatus::OutForRental);
        assert_eq!(config.product_swap, ProductSwapPolicy::Unlink);
        assert!(config.compare_and_swap);
        assert_eq!(config.code_attempts, 8);
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = EngineConfig::default()
            .with_env_overrides(env(&[
                ("CAREFLEET_COMPARE_AND_SWAP", "false"),
                ("CAREFLEET_RESERVATION_STATUS", "out_for_rental"),
                ("CAREFLEET_CODE_ATTEMPTS", "2"),
            ]))
            .unwrap();
        assert!(!config.compare_and_swap);
        assert_eq!(config.reservation_status, ReservationStatus::OutForRental);
        assert_eq!(config.code_attempts, 2);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = EngineConfig::default()
            .with_env_overrides(env(&[("CAREFLEET_PRODUCT_SWAP", "shred")]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));

        let err = EngineConfig::from_toml_str("code_attempts = 0").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
