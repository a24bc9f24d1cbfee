use super::traits::Storage;
use crate::common::error::{Result, ShopError};
use crate::domain::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// In-memory storage implementation for development/testing.
///
/// `place_order` performs its stock check and decrement under a single
/// variants-map lock, so concurrent order placement cannot drive stock
/// negative.
pub struct InMemoryStorage {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    credentials: Arc<Mutex<HashMap<Uuid, Credential>>>,
    products: Arc<Mutex<HashMap<Uuid, Product>>>,
    variants: Arc<Mutex<HashMap<Uuid, Variant>>>,
    addresses: Arc<Mutex<HashMap<Uuid, Address>>>,
    orders: Arc<Mutex<HashMap<Uuid, Order>>>,
    order_items: Arc<Mutex<HashMap<Uuid, OrderItem>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
            credentials: Arc::new(Mutex::new(HashMap::new())),
            products: Arc::new(Mutex::new(HashMap::new())),
            variants: Arc::new(Mutex::new(HashMap::new())),
            addresses: Arc::new(Mutex::new(HashMap::new())),
            orders: Arc::new(Mutex::new(HashMap::new())),
            order_items: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn paginate<T>(mut rows: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Vec<T> {
    let offset = offset.unwrap_or(0);
    if offset >= rows.len() {
        return Vec::new();
    }
    rows.drain(..offset);
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: &mut User) -> Result<()> {
        let id = user.id.unwrap_or_else(Uuid::new_v4);
        user.id = Some(id);

        let mut users = self.users.lock().unwrap();
        users.insert(id, user.clone());

        debug!("created user {} with id {}", user.email, id);
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        let user = users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned();
        Ok(user)
    }

    async fn get_all_users(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<User>> {
        let users = self.users.lock().unwrap();
        let mut rows: Vec<User> = users.values().cloned().collect();
        rows.sort_by_key(|u| u.created_at);
        Ok(paginate(rows, limit, offset))
    }

    async fn count_users(&self) -> Result<usize> {
        Ok(self.users.lock().unwrap().len())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        users
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::NotFound("user".to_string()))
    }

    async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let mut credentials = self.credentials.lock().unwrap();
        credentials.insert(credential.user_id, credential.clone());
        Ok(())
    }

    async fn get_credential(&self, user_id: Uuid) -> Result<Option<Credential>> {
        let credentials = self.credentials.lock().unwrap();
        Ok(credentials.get(&user_id).cloned())
    }

    async fn delete_credential(&self, user_id: Uuid) -> Result<()> {
        let mut credentials = self.credentials.lock().unwrap();
        credentials
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::NotFound("credential".to_string()))
    }

    async fn create_product(&self, product: &mut Product) -> Result<()> {
        let id = product.id.unwrap_or_else(Uuid::new_v4);
        product.id = Some(id);

        let mut products = self.products.lock().unwrap();
        products.insert(id, product.clone());

        debug!("created product {} with id {}", product.name, id);
        Ok(())
    }

    async fn get_product_by_id(&self, product_id: Uuid) -> Result<Option<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products.get(&product_id).cloned())
    }

    async fn get_all_products(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Product>> {
        let products = self.products.lock().unwrap();
        let mut rows: Vec<Product> = products.values().cloned().collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(paginate(rows, limit, offset))
    }

    async fn count_products(&self) -> Result<usize> {
        Ok(self.products.lock().unwrap().len())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let id = product
            .id
            .ok_or_else(|| ShopError::InvalidInput("product id missing".to_string()))?;
        let mut products = self.products.lock().unwrap();
        if !products.contains_key(&id) {
            return Err(ShopError::NotFound("product".to_string()));
        }
        products.insert(id, product.clone());
        Ok(())
    }

    async fn delete_product(&self, product_id: Uuid) -> Result<()> {
        let mut products = self.products.lock().unwrap();
        products
            .remove(&product_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::NotFound("product".to_string()))
    }

    async fn create_variant(&self, variant: &mut Variant) -> Result<()> {
        let id = variant.id.unwrap_or_else(Uuid::new_v4);
        variant.id = Some(id);

        let mut variants = self.variants.lock().unwrap();
        variants.insert(id, variant.clone());

        debug!("created variant {} with id {}", variant.name, id);
        Ok(())
    }

    async fn get_variant_by_id(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        let variants = self.variants.lock().unwrap();
        Ok(variants.get(&variant_id).cloned())
    }

    async fn get_variants_by_product(&self, product_id: Uuid) -> Result<Vec<Variant>> {
        let variants = self.variants.lock().unwrap();
        let mut rows: Vec<Variant> = variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.created_at);
        Ok(rows)
    }

    async fn update_variant(&self, variant: &Variant) -> Result<()> {
        let id = variant
            .id
            .ok_or_else(|| ShopError::InvalidInput("variant id missing".to_string()))?;
        let mut variants = self.variants.lock().unwrap();
        if !variants.contains_key(&id) {
            return Err(ShopError::NotFound("variant".to_string()));
        }
        variants.insert(id, variant.clone());
        Ok(())
    }

    async fn delete_variant(&self, variant_id: Uuid) -> Result<()> {
        let mut variants = self.variants.lock().unwrap();
        variants
            .remove(&variant_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::NotFound("variant".to_string()))
    }

    async fn create_address(&self, address: &mut Address) -> Result<()> {
        let id = address.id.unwrap_or_else(Uuid::new_v4);
        address.id = Some(id);

        let mut addresses = self.addresses.lock().unwrap();
        addresses.insert(id, address.clone());
        Ok(())
    }

    async fn get_address_by_id(&self, address_id: Uuid) -> Result<Option<Address>> {
        let addresses = self.addresses.lock().unwrap();
        Ok(addresses.get(&address_id).cloned())
    }

    async fn get_addresses_by_user(&self, user_id: Uuid) -> Result<Vec<Address>> {
        let addresses = self.addresses.lock().unwrap();
        let mut rows: Vec<Address> = addresses
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn update_address(&self, address: &Address) -> Result<()> {
        let id = address
            .id
            .ok_or_else(|| ShopError::InvalidInput("address id missing".to_string()))?;
        let mut addresses = self.addresses.lock().unwrap();
        if !addresses.contains_key(&id) {
            return Err(ShopError::NotFound("address".to_string()));
        }
        addresses.insert(id, address.clone());
        Ok(())
    }

    async fn delete_address(&self, address_id: Uuid) -> Result<()> {
        let mut addresses = self.addresses.lock().unwrap();
        addresses
            .remove(&address_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::NotFound("address".to_string()))
    }

    async fn snapshot_order_addresses(
        &self,
        address_id: Uuid,
        snapshot: &AddressSnapshot,
    ) -> Result<u64> {
        let mut orders = self.orders.lock().unwrap();
        let mut touched = 0;
        for order in orders.values_mut() {
            if order.address_id == Some(address_id) {
                order.address_snapshot = Some(snapshot.clone());
                order.address_id = None;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn place_order(&self, order: &mut Order, items: &mut [OrderItem]) -> Result<()> {
        let order_id = order.id.unwrap_or_else(Uuid::new_v4);
        order.id = Some(order_id);

        {
            // Check and decrement under one lock; apply on a scratch copy so
            // duplicate variant ids within one order are counted cumulatively.
            let mut variants = self.variants.lock().unwrap();
            let mut reserved: HashMap<Uuid, Variant> = HashMap::new();
            for item in items.iter() {
                let variant = match reserved.get(&item.variant_id) {
                    Some(v) => v.clone(),
                    None => variants
                        .get(&item.variant_id)
                        .cloned()
                        .ok_or_else(|| ShopError::NotFound("variant".to_string()))?,
                };
                if variant.stock < item.quantity {
                    return Err(ShopError::InsufficientStock {
                        variant_id: item.variant_id,
                        requested: item.quantity,
                        available: variant.stock,
                    });
                }
                let mut updated = variant;
                updated.stock -= item.quantity;
                reserved.insert(item.variant_id, updated);
            }
            for (variant_id, variant) in reserved {
                variants.insert(variant_id, variant);
            }
        }

        let mut order_items = self.order_items.lock().unwrap();
        for item in items.iter_mut() {
            let item_id = Uuid::new_v4();
            item.id = Some(item_id);
            item.order_id = Some(order_id);
            order_items.insert(item_id, item.clone());
        }

        let mut orders = self.orders.lock().unwrap();
        orders.insert(order_id, order.clone());

        debug!("placed order {} with {} items", order_id, items.len());
        Ok(())
    }

    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.lock().unwrap();
        Ok(orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let order_items = self.order_items.lock().unwrap();
        Ok(order_items
            .values()
            .filter(|i| i.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn get_orders_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Order>> {
        let orders = self.orders.lock().unwrap();
        let mut rows: Vec<Order> = orders
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.created_at);
        Ok(paginate(rows, limit, offset))
    }

    async fn count_orders_by_user(&self, user_id: Uuid) -> Result<usize> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .count())
    }

    async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<()> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| ShopError::NotFound("order".to_string()))?;
        order.status = status;
        Ok(())
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<bool> {
        // Flip the status first, under the orders lock: of any number of
        // concurrent cancels, exactly one observes a non-cancelled order and
        // goes on to restore stock.
        {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .get_mut(&order_id)
                .ok_or_else(|| ShopError::NotFound("order".to_string()))?;
            if order.status == OrderStatus::Cancelled {
                return Ok(false);
            }
            order.status = OrderStatus::Cancelled;
        }

        let items: Vec<OrderItem> = {
            let order_items = self.order_items.lock().unwrap();
            order_items
                .values()
                .filter(|i| i.order_id == Some(order_id))
                .cloned()
                .collect()
        };
        let mut variants = self.variants.lock().unwrap();
        for item in items {
            match variants.get_mut(&item.variant_id) {
                Some(variant) => {
                    variant.stock += item.quantity;
                    debug!(
                        "restored {} units to variant {}, stock now {}",
                        item.quantity, item.variant_id, variant.stock
                    );
                }
                None => warn!(
                    "variant {} no longer exists, skipping stock restore for order {}",
                    item.variant_id, order_id
                ),
            }
        }
        Ok(true)
    }

    async fn anonymize_orders_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut orders = self.orders.lock().unwrap();
        let mut touched = 0;
        for order in orders.values_mut() {
            if order.user_id == Some(user_id) {
                order.user_id = None;
                touched += 1;
            }
        }
        Ok(touched)
    }
}
