//! Postgres storage on sqlx transactions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use crate::domain::aggregates::{
    Category, IntentStatus, LineItem, Order, PaymentIntent, PriceSnapshot, Product, ProductStatus, Store, User,
};
use crate::domain::value_objects::{InvoiceCode, Money, Quantity};
use crate::error::{MarketError, Result};
use super::{Catalog, Directory, OrderLedger, PaymentLedger, Storage, UnitOfWork};

#[derive(Clone)]
pub struct PgStorage { pool: PgPool }

impl PgStorage {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl Storage for PgStorage {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork> { Ok(PgUnitOfWork { tx: self.pool.begin().await? }) }
}

/// Wraps a sqlx transaction; sqlx rolls back on drop.
pub struct PgUnitOfWork { tx: Transaction<'static, Postgres> }

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<()> { Ok(self.tx.commit().await?) }
    async fn rollback(self) -> Result<()> { Ok(self.tx.rollback().await?) }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, store_id: Uuid, category_id: Uuid, name: String, slug: String, description: String,
    price: Decimal, discount_price: Option<Decimal>, stock: i64, sold_count: i64, status: String, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = MarketError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, store_id: r.store_id, category_id: r.category_id, name: r.name, slug: r.slug, description: r.description,
            price: Money::new(r.price), discount_price: r.discount_price.map(Money::new), stock: r.stock, sold_count: r.sold_count,
            status: r.status.parse()?, updated_at: r.updated_at, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct StoreRow { id: Uuid, owner_id: Uuid, name: String, status: String, updated_at: DateTime<Utc> }

impl TryFrom<StoreRow> for Store {
    type Error = MarketError;
    fn try_from(r: StoreRow) -> Result<Self> {
        Ok(Store { id: r.id, owner_id: r.owner_id, name: r.name, status: r.status.parse()?, updated_at: r.updated_at, events: vec![] })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, status: String, is_leaf: bool, has_active_product: bool }

impl TryFrom<CategoryRow> for Category {
    type Error = MarketError;
    fn try_from(r: CategoryRow) -> Result<Self> {
        Ok(Category {
            id: r.id, name: r.name, status: r.status.parse()?, is_leaf: r.is_leaf,
            has_active_product: r.has_active_product,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, buyer_id: Uuid, shipping_address_id: Uuid, invoice_code: String, payment_method: String, total: Decimal,
    status: String, created_at: DateTime<Utc>, paid_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: Uuid, order_id: Uuid, snapshot_id: Uuid, product_id: Uuid, product_name: String, quantity: i64,
    unit_price: Decimal, subtotal: Decimal,
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = MarketError;
    fn try_from(r: LineItemRow) -> Result<Self> {
        Ok(LineItem {
            id: r.id, order_id: r.order_id, snapshot_id: r.snapshot_id, product_id: r.product_id, product_name: r.product_name,
            quantity: Quantity::try_from(r.quantity)?, unit_price: Money::new(r.unit_price), subtotal: Money::new(r.subtotal),
        })
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: Uuid, order_id: Uuid, method: String, status: String, gateway_ref: Option<String>, expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = MarketError;
    fn try_from(r: IntentRow) -> Result<Self> {
        Ok(PaymentIntent {
            id: r.id, order_id: r.order_id, method: r.method, status: r.status.parse()?, gateway_ref: r.gateway_ref,
            expires_at: r.expires_at, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

const PRODUCT_COLUMNS: &str =
    "id, store_id, category_id, name, slug, description, price, discount_price, stock, sold_count, status, updated_at";
const ORDER_COLUMNS: &str =
    "id, buyer_id, shipping_address_id, invoice_code, payment_method, total, status, created_at, paid_at";
const INTENT_COLUMNS: &str = "id, order_id, method, status, gateway_ref, expires_at, created_at, updated_at";

impl PgUnitOfWork {
    async fn fetch_product(&mut self, id: Uuid, lock: bool) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{}", if lock { " FOR UPDATE" } else { "" });
        sqlx::query_as::<_, ProductRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await?.map(Product::try_from).transpose()
    }

    async fn fetch_intent(&mut self, id: Uuid, lock: bool) -> Result<Option<PaymentIntent>> {
        let sql = format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1{}", if lock { " FOR UPDATE" } else { "" });
        sqlx::query_as::<_, IntentRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await?.map(PaymentIntent::try_from).transpose()
    }

    async fn fetch_order(&mut self, id: Uuid, lock: bool) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}", if lock { " FOR UPDATE" } else { "" });
        let Some(r) = sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, LineItemRow>("SELECT id, order_id, snapshot_id, product_id, product_name, quantity, unit_price, subtotal FROM line_items WHERE order_id = $1 ORDER BY id")
            .bind(id).fetch_all(&mut *self.tx).await?
            .into_iter().map(LineItem::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Some(Order {
            id: r.id, buyer_id: r.buyer_id, shipping_address_id: r.shipping_address_id,
            invoice_code: InvoiceCode::from_persisted(r.invoice_code), payment_method: r.payment_method, total: Money::new(r.total),
            status: r.status.parse()?, created_at: r.created_at, paid_at: r.paid_at, items, events: vec![],
        }))
    }

    async fn adjust_stock(&mut self, id: Uuid, delta: i64) -> Result<()> {
        let done = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0")
            .bind(id).bind(delta).execute(&mut *self.tx).await?;
        if done.rows_affected() == 0 {
            let available = sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = $1")
                .bind(id).fetch_optional(&mut *self.tx).await?.ok_or(MarketError::ProductNotFound(id))?;
            let requested = u32::try_from(-delta).unwrap_or(u32::MAX);
            return Err(MarketError::InsufficientStock { product_id: id, requested, available });
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for PgUnitOfWork {
    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = $1").bind(id).fetch_optional(&mut *self.tx).await?)
    }

    async fn address_owned_by(&mut self, address_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM addresses WHERE id = $1 AND user_id = $2)")
            .bind(address_id).bind(user_id).fetch_one(&mut *self.tx).await?)
    }
}

#[async_trait]
impl Catalog for PgUnitOfWork {
    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>> { self.fetch_product(id, false).await }
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>> { self.fetch_product(id, true).await }
    async fn decrement_stock(&mut self, id: Uuid, qty: u32) -> Result<()> { self.adjust_stock(id, -i64::from(qty)).await }
    async fn restore_stock(&mut self, id: Uuid, qty: u32) -> Result<()> { self.adjust_stock(id, i64::from(qty)).await }

    async fn increment_sold_count(&mut self, id: Uuid, qty: u32) -> Result<()> {
        sqlx::query("UPDATE products SET sold_count = sold_count + $2 WHERE id = $1")
            .bind(id).bind(i64::from(qty)).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn save_product_status(&mut self, product: &Product) -> Result<()> {
        sqlx::query("UPDATE products SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(product.id).bind(product.status.as_str()).bind(product.updated_at).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn get_store(&mut self, id: Uuid) -> Result<Option<Store>> {
        sqlx::query_as::<_, StoreRow>("SELECT id, owner_id, name, status, updated_at FROM stores WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?.map(Store::try_from).transpose()
    }

    async fn get_store_by_owner(&mut self, owner_id: Uuid) -> Result<Option<Store>> {
        sqlx::query_as::<_, StoreRow>("SELECT id, owner_id, name, status, updated_at FROM stores WHERE owner_id = $1")
            .bind(owner_id).fetch_optional(&mut *self.tx).await?.map(Store::try_from).transpose()
    }

    async fn save_store_status(&mut self, store: &Store) -> Result<()> {
        sqlx::query("UPDATE stores SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(store.id).bind(store.status.as_str()).bind(store.updated_at).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> {
        sqlx::query_as::<_, CategoryRow>("SELECT id, name, status, is_leaf, has_active_product FROM categories WHERE id = $1")
            .bind(id).fetch_optional(&mut *self.tx).await?.map(Category::try_from).transpose()
    }

    async fn category_has_active_product(&mut self, id: Uuid) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE category_id = $1 AND status = $2)")
            .bind(id).bind(ProductStatus::Active.as_str()).fetch_one(&mut *self.tx).await?)
    }

    async fn set_category_flag(&mut self, id: Uuid, has_active_product: bool) -> Result<()> {
        sqlx::query("UPDATE categories SET has_active_product = $2 WHERE id = $1")
            .bind(id).bind(has_active_product).execute(&mut *self.tx).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderLedger for PgUnitOfWork {
    async fn insert_snapshot(&mut self, s: &PriceSnapshot) -> Result<()> {
        sqlx::query("INSERT INTO price_snapshots (id, product_id, name, slug, description, price, discount_price, store_id, category_id, captured_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(s.id).bind(s.product_id).bind(&s.name).bind(&s.slug).bind(&s.description).bind(s.price.amount())
            .bind(s.discount_price.map(|d| d.amount())).bind(s.store_id).bind(s.category_id).bind(s.captured_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn invoice_exists(&mut self, code: &InvoiceCode) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE invoice_code = $1)")
            .bind(code.as_str()).fetch_one(&mut *self.tx).await?)
    }

    async fn insert_order(&mut self, o: &Order) -> Result<()> {
        sqlx::query("INSERT INTO orders (id, buyer_id, shipping_address_id, invoice_code, payment_method, total, status, created_at, paid_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(o.id).bind(o.buyer_id).bind(o.shipping_address_id).bind(o.invoice_code.as_str()).bind(&o.payment_method)
            .bind(o.total.amount()).bind(o.status.as_str()).bind(o.created_at).bind(o.paid_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_line_item(&mut self, i: &LineItem) -> Result<()> {
        sqlx::query("INSERT INTO line_items (id, order_id, snapshot_id, product_id, product_name, quantity, unit_price, subtotal) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(i.id).bind(i.order_id).bind(i.snapshot_id).bind(i.product_id).bind(&i.product_name)
            .bind(i64::from(i.quantity.value())).bind(i.unit_price.amount()).bind(i.subtotal.amount())
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>> { self.fetch_order(id, false).await }
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>> { self.fetch_order(id, true).await }

    async fn save_order_status(&mut self, o: &Order) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, paid_at = $3 WHERE id = $1")
            .bind(o.id).bind(o.status.as_str()).bind(o.paid_at).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn stale_pending_orders(&mut self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM orders WHERE status = 'pending' AND created_at < $1 ORDER BY created_at")
            .bind(created_before).fetch_all(&mut *self.tx).await?)
    }
}

#[async_trait]
impl PaymentLedger for PgUnitOfWork {
    async fn get_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>> { self.fetch_intent(id, false).await }
    async fn lock_intent(&mut self, id: Uuid) -> Result<Option<PaymentIntent>> { self.fetch_intent(id, true).await }

    async fn pending_intent_for_order(&mut self, order_id: Uuid) -> Result<Option<PaymentIntent>> {
        let sql = format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE order_id = $1 AND status = $2 FOR UPDATE");
        sqlx::query_as::<_, IntentRow>(&sql).bind(order_id).bind(IntentStatus::Pending.as_str())
            .fetch_optional(&mut *self.tx).await?.map(PaymentIntent::try_from).transpose()
    }

    async fn insert_intent(&mut self, i: &PaymentIntent) -> Result<()> {
        sqlx::query("INSERT INTO payment_intents (id, order_id, method, status, gateway_ref, expires_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(i.id).bind(i.order_id).bind(&i.method).bind(i.status.as_str()).bind(&i.gateway_ref)
            .bind(i.expires_at).bind(i.created_at).bind(i.updated_at)
            .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn save_intent(&mut self, i: &PaymentIntent) -> Result<()> {
        sqlx::query("UPDATE payment_intents SET status = $2, gateway_ref = $3, updated_at = $4 WHERE id = $1")
            .bind(i.id).bind(i.status.as_str()).bind(&i.gateway_ref).bind(i.updated_at).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn expire_pending_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("UPDATE payment_intents SET status = $3, updated_at = $4 WHERE order_id = $1 AND status = $2")
            .bind(order_id).bind(IntentStatus::Pending.as_str()).bind(IntentStatus::Expired.as_str()).bind(now)
            .execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    async fn expire_overdue_intents(&mut self, order_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("UPDATE payment_intents SET status = $3, updated_at = $4 WHERE order_id = $1 AND status = $2 AND expires_at <= $4")
            .bind(order_id).bind(IntentStatus::Pending.as_str()).bind(IntentStatus::Expired.as_str()).bind(now)
            .execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    async fn orders_with_overdue_intents(&mut self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT DISTINCT order_id FROM payment_intents WHERE status = $1 AND expires_at <= $2")
            .bind(IntentStatus::Pending.as_str()).bind(now).fetch_all(&mut *self.tx).await?)
    }
}
