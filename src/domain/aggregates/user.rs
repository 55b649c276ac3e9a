//! Buyer/seller identity as seen by the fulfillment core

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User { pub id: Uuid, pub name: String, pub email: String }
