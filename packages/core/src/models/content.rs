use crate::models::{CategoryId, TenantId};
use serde::{Deserialize, Serialize};

/// A content item (post/entry) filed under at most one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub tenant_id: TenantId,
    pub id: String,
    pub title: String,
    /// `None` means uncategorized
    pub category_id: Option<CategoryId>,
}
