//! Aggregates module

/// Status enums persist as lowercase text.
macro_rules! text_status {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::MarketError;
            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::MarketError::Storage(format!("unknown {} '{}'", stringify!($name), other))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

pub mod category;
pub mod order;
pub mod payment_intent;
pub mod price_snapshot;
pub mod product;
pub mod store;
pub mod user;

pub use category::{Category, CategoryStatus};
pub use order::{LineItem, Order, OrderStatus};
pub use payment_intent::{IntentStatus, PaymentIntent, Transition};
pub use price_snapshot::PriceSnapshot;
pub use product::{Product, ProductStatus};
pub use store::{Store, StoreStatus};
pub use user::User;
