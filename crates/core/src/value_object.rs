//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity: two rental links naming the same rental,
/// customer and due date are the same rental link. They are replaced, never
/// mutated in place.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct RentalLink { rental_id: String, customer: String }
///
/// impl ValueObject for RentalLink {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
