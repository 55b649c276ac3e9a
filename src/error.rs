//! Error taxonomy for the fulfillment core

use thiserror::Error;
use uuid::Uuid;

/// Stable category each error reports to the boundary layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    InvalidState,
    InsufficientStock,
    ValidationFailed,
    Internal,
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Store not found")]
    StoreNotFound,

    #[error("Category {0} not found")]
    CategoryNotFound(Uuid),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Payment intent {0} not found")]
    IntentNotFound(Uuid),

    #[error("Shipping address is not owned by the buyer")]
    AddressAccessDenied,

    #[error("Product is not owned by the requesting seller")]
    ProductAccessDenied,

    #[error("Order is not owned by the requesting buyer")]
    OrderAccessDenied,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, requested: u32, available: i64 },

    #[error("Product {0} is not available for ordering")]
    ProductUnavailable(Uuid),

    #[error("Order is not pending")]
    OrderNotPending,

    #[error("Payment intent cannot transition from its current state")]
    InvalidIntentState,

    #[error("Already active")]
    AlreadyActive,

    #[error("Already inactive")]
    AlreadyInactive,

    #[error("Already suspended")]
    AlreadySuspended,

    #[error("Not suspended")]
    NotSuspended,

    #[error("Product is suspended")]
    ProductSuspended,

    #[error("Store is suspended")]
    StoreSuspended,

    #[error("Store is not awaiting approval")]
    StoreNotPending,

    #[error("Store has not been approved")]
    StoreNotApproved,

    #[error("Store is not active")]
    StoreInactive,

    #[error("Category is not active")]
    CategoryInactive,

    #[error("Products can only be listed under a leaf category")]
    CategoryNotLeaf,

    #[error("Product is out of stock")]
    OutOfStock,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        use MarketError::*;
        match self {
            UserNotFound(_) | ProductNotFound(_) | StoreNotFound | CategoryNotFound(_) | OrderNotFound(_)
            | IntentNotFound(_) => ErrorKind::NotFound,
            AddressAccessDenied | ProductAccessDenied | OrderAccessDenied => ErrorKind::AccessDenied,
            InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ProductUnavailable(_) | OrderNotPending | InvalidIntentState | AlreadyActive | AlreadyInactive
            | AlreadySuspended | NotSuspended | ProductSuspended | StoreSuspended | StoreNotPending
            | StoreNotApproved | StoreInactive | CategoryInactive | CategoryNotLeaf | OutOfStock => ErrorKind::InvalidState,
            Validation(_) => ErrorKind::ValidationFailed,
            Database(_) | Storage(_) | Config(_) => ErrorKind::Internal,
        }
    }
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(err: validator::ValidationErrors) -> Self { MarketError::Validation(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(MarketError::UserNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
        assert_eq!(MarketError::AddressAccessDenied.kind(), ErrorKind::AccessDenied);
        assert_eq!(MarketError::InvalidIntentState.kind(), ErrorKind::InvalidState);
        assert_eq!(MarketError::Storage("disk".into()).kind(), ErrorKind::Internal);
        let e = MarketError::InsufficientStock { product_id: Uuid::nil(), requested: 3, available: 1 };
        assert_eq!(e.kind(), ErrorKind::InsufficientStock);
        assert!(e.to_string().contains("requested 3"));
    }
}
