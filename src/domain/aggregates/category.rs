//! Category node; only leaves host products

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub status: CategoryStatus,
    pub is_leaf: bool,
    /// Derived; refreshed out-of-band after product status changes.
    pub has_active_product: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus { #[default] Active, Inactive }

text_status!(CategoryStatus { Active => "active", Inactive => "inactive" });

impl Category {
    pub fn is_active(&self) -> bool { self.status == CategoryStatus::Active }
}
