use serde::{Deserialize, Serialize};

use crate::billing::error::{BillingError, BillingResult};

/// Storefront role carried in the `role` claim of the session token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buyer" | "user" => Some(Role::Buyer),
            "seller" => Some(Role::Seller),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// key: caller-identity -> explicit actor passed into every billing operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i32,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: i32, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn seller(user_id: i32) -> Self {
        Self::new(user_id, Role::Seller)
    }

    pub fn admin(user_id: i32) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn buyer(user_id: i32) -> Self {
        Self::new(user_id, Role::Buyer)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> BillingResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BillingError::Forbidden("admin role required"))
        }
    }

    pub fn require_seller(&self) -> BillingResult<()> {
        match self.role {
            Role::Seller | Role::Admin => Ok(()),
            Role::Buyer => Err(BillingError::Forbidden("seller role required")),
        }
    }

    pub fn require_owner(&self, owner_id: i32) -> BillingResult<()> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(BillingError::Forbidden("only the owner may do this"))
        }
    }

    pub fn require_owner_or_admin(&self, owner_id: i32) -> BillingResult<()> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(BillingError::Forbidden("owner or admin required"))
        }
    }
}
