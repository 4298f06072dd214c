//! Category management permission checks
//!
//! Authentication lives outside this crate; the tree only asks one question
//! before every mutating operation. A `false` answer becomes
//! `CategoryTreeError::PermissionDenied` before any storage is touched.

use crate::models::{TenantId, UserId};
use std::collections::HashSet;

pub trait PermissionChecker: Send + Sync {
    fn has_category_manage_permission(&self, tenant: &TenantId, user: &UserId) -> bool;
}

/// Grants everything; for operator tooling running with full access
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_category_manage_permission(&self, _tenant: &TenantId, _user: &UserId) -> bool {
        true
    }
}

/// Explicit `(tenant, user)` grants
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: HashSet<(TenantId, UserId)>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, tenant: impl Into<TenantId>, user: impl Into<UserId>) -> Self {
        self.grants.insert((tenant.into(), user.into()));
        self
    }
}

impl PermissionChecker for StaticPermissions {
    fn has_category_manage_permission(&self, tenant: &TenantId, user: &UserId) -> bool {
        self.grants.contains(&(tenant.clone(), user.clone()))
    }
}
