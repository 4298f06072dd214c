//! Data Models
//!
//! Plain data types shared by the store, the maintainer and the read path:
//!
//! - Identifiers: [`TenantId`], [`UserId`], [`CategoryId`]
//! - [`Category`] - one persisted nested-set row
//! - [`NewCategory`] - validated insert payload
//! - [`CategoryCounts`] - direct/total counters for one category
//! - [`ContentItem`] - a piece of content filed under (at most) one category

mod category;
mod content;

pub use category::{Category, CategoryCounts, CategoryId, NewCategory, TenantId, UserId};
pub use content::ContentItem;
