//! Per-request permission predicates.
//!
//! Stateless checks over the authenticated principal and the target
//! resource's owner. Handlers compose them explicitly (OR for the usual
//! staff-or-owner gate, AND where the route demands both).

use crate::models::User;

/// Grants iff the principal carries the staff flag.
pub fn is_staff(user: &User) -> bool {
    user.is_staff
}

/// Grants iff the resource's owner is the principal.
pub fn is_owner(user: &User, owner: &str) -> bool {
    user.username == owner
}

/// staff OR owner: the standard gate on courses and most lesson routes.
pub fn is_staff_or_owner(user: &User, owner: &str) -> bool {
    is_staff(user) || is_owner(user, owner)
}

/// owner AND staff, for lesson delete only. Stricter than update; kept as
/// the product specifies it.
pub fn is_staff_and_owner(user: &User, owner: &str) -> bool {
    is_staff(user) && is_owner(user, owner)
}
