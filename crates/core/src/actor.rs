//! Acting identity recorded on history and audit entries.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// The user (or process) performing an operation.
///
/// History entries record `uid` as `by` and `display_name` as `by_name`.
/// When no identity is available the [`Actor::system`] actor is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl Actor {
    pub const SYSTEM: &'static str = "system";

    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM, Self::SYSTEM)
    }

    /// Resolve an optional identity, falling back to the system actor.
    pub fn or_system(actor: Option<Actor>) -> Self {
        actor.unwrap_or_else(Self::system)
    }

    pub fn is_system(&self) -> bool {
        self.uid == Self::SYSTEM
    }
}

impl ValueObject for Actor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identity_falls_back_to_system() {
        let actor = Actor::or_system(None);
        assert_eq!(actor.uid, "system");
        assert_eq!(actor.display_name, "system");
        assert!(actor.is_system());
    }

    #[test]
    fn explicit_identity_is_kept() {
        let actor = Actor::or_system(Some(Actor::new("u1", "Asha").with_email("asha@example.com")));
        assert_eq!(actor.uid, "u1");
        assert_eq!(actor.email.as_deref(), Some("asha@example.com"));
        assert!(!actor.is_system());
    }
}
