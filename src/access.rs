use std::collections::HashSet;

use crate::model::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    Staff,
}

/// Whoever is making the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Staff,
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Customer,
        }
    }
}

/// Capability check consulted before any mutation other than booking creation.
pub trait AccessPolicy: Send + Sync {
    /// May `actor` confirm, complete, cancel or reschedule bookings on a resource of `kind`?
    fn may_manage(&self, actor: &Actor, kind: ResourceKind) -> bool;

    /// May `actor` edit resources, windows and holidays?
    fn may_configure(&self, actor: &Actor) -> bool;
}

/// Staff manage everything; customers can only request bookings.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaffPolicy;

impl AccessPolicy for StaffPolicy {
    fn may_manage(&self, actor: &Actor, _kind: ResourceKind) -> bool {
        actor.role == Role::Staff
    }

    fn may_configure(&self, actor: &Actor) -> bool {
        actor.role == Role::Staff
    }
}

/// Maps login names to roles. Anyone not listed is a customer.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    staff: HashSet<String>,
}

impl RoleDirectory {
    pub fn new(staff: impl IntoIterator<Item = String>) -> Self {
        Self {
            staff: staff.into_iter().collect(),
        }
    }

    pub fn actor(&self, user: &str) -> Actor {
        if self.staff.contains(user) {
            Actor::staff(user)
        } else {
            Actor::customer(user)
        }
    }
}
