use crate::common::error::Result;
use crate::domain::*;
use async_trait::async_trait;
use uuid::Uuid;

/// Storage trait for persisting shop data (users, products, variants,
/// addresses, orders). Constructed once at startup and passed into the
/// services as `Arc<dyn Storage>`.
///
/// Besides plain CRUD there are three workflow operations with stronger
/// contracts: `place_order` (atomic stock reservation plus order/item
/// insertion), `cancel_order` (atomic status flip plus stock restoration),
/// and `snapshot_order_addresses` (the address-deletion guard).
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn create_user(&self, user: &mut User) -> Result<()>;
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_all_users(&self, limit: Option<usize>, offset: Option<usize>) -> Result<Vec<User>>;
    async fn count_users(&self) -> Result<usize>;
    async fn delete_user(&self, user_id: Uuid) -> Result<()>;

    // Credential operations
    async fn upsert_credential(&self, credential: &Credential) -> Result<()>;
    async fn get_credential(&self, user_id: Uuid) -> Result<Option<Credential>>;
    async fn delete_credential(&self, user_id: Uuid) -> Result<()>;

    // Product operations
    async fn create_product(&self, product: &mut Product) -> Result<()>;
    async fn get_product_by_id(&self, product_id: Uuid) -> Result<Option<Product>>;
    async fn get_all_products(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Product>>;
    async fn count_products(&self) -> Result<usize>;
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn delete_product(&self, product_id: Uuid) -> Result<()>;

    // Variant operations
    async fn create_variant(&self, variant: &mut Variant) -> Result<()>;
    async fn get_variant_by_id(&self, variant_id: Uuid) -> Result<Option<Variant>>;
    async fn get_variants_by_product(&self, product_id: Uuid) -> Result<Vec<Variant>>;
    async fn update_variant(&self, variant: &Variant) -> Result<()>;
    async fn delete_variant(&self, variant_id: Uuid) -> Result<()>;

    // Address operations
    async fn create_address(&self, address: &mut Address) -> Result<()>;
    async fn get_address_by_id(&self, address_id: Uuid) -> Result<Option<Address>>;
    async fn get_addresses_by_user(&self, user_id: Uuid) -> Result<Vec<Address>>;
    async fn update_address(&self, address: &Address) -> Result<()>;
    async fn delete_address(&self, address_id: Uuid) -> Result<()>;

    /// For every order referencing the address: copy the snapshot inline and
    /// clear the reference. Returns the number of orders touched.
    async fn snapshot_order_addresses(
        &self,
        address_id: Uuid,
        snapshot: &AddressSnapshot,
    ) -> Result<u64>;

    // Order operations

    /// Atomically reserve stock for every item and insert the order and its
    /// items. All-or-nothing: on any failure no rows are written and no
    /// stock is decremented. Fails with `InsufficientStock` (reporting the
    /// available amount) when any variant's stock is short, and with
    /// `NotFound` when a variant is missing. Assigns ids on success.
    async fn place_order(&self, order: &mut Order, items: &mut [OrderItem]) -> Result<()>;

    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Option<Order>>;
    async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;
    async fn get_orders_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Order>>;
    async fn count_orders_by_user(&self, user_id: Uuid) -> Result<usize>;
    async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<()>;

    /// Flip the order to `cancelled` and restore each item's quantity to its
    /// variant's stock, atomically with respect to other cancellations: only
    /// the call that actually transitions the status restores stock, so
    /// concurrent cancels of the same order cannot restore twice. Returns
    /// `false` when the order was already cancelled (nothing restored).
    /// Items whose variant no longer exists are skipped.
    async fn cancel_order(&self, order_id: Uuid) -> Result<bool>;

    /// Clear the user reference on all of a user's orders (account
    /// deletion). Returns the number of orders touched.
    async fn anonymize_orders_for_user(&self, user_id: Uuid) -> Result<u64>;
}
