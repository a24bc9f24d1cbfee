//! Order placement and lifecycle rules.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::common::error::{Result, ShopError};
use crate::domain::*;
use crate::storage::Storage;

/// Days between order creation and the promised delivery date.
const DELIVERY_OFFSET_DAYS: i64 = 7;

/// Requested line in a new order.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderItem {
    pub variant_id: Uuid,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct OrderService {
    storage: Arc<dyn Storage>,
}

impl OrderService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Place an order for the calling user.
    ///
    /// Validation happens up front (address ownership, positive quantities,
    /// variant existence), prices are frozen from the live variants, and the
    /// stock reservation plus order/item insertion happen in one atomic
    /// storage call. A shortage fails with `InsufficientStock` reporting the
    /// available amount and leaves no partial state behind.
    pub async fn create_order(
        &self,
        principal: &Principal,
        address_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<OrderView> {
        let user = self
            .storage
            .get_user_by_id(principal.user_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("user".to_string()))?;

        let address = self
            .storage
            .get_address_by_id(address_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("address".to_string()))?;
        if address.user_id != principal.user_id {
            return Err(ShopError::InvalidRelation(
                "address does not belong to the ordering user".to_string(),
            ));
        }

        if items.is_empty() {
            return Err(ShopError::InvalidInput(
                "order must contain at least one item".to_string(),
            ));
        }

        let mut order_items = Vec::with_capacity(items.len());
        for requested in items {
            if requested.quantity == 0 {
                return Err(ShopError::InvalidInput(
                    "item quantity must be greater than zero".to_string(),
                ));
            }
            let variant = self
                .storage
                .get_variant_by_id(requested.variant_id)
                .await?
                .ok_or_else(|| ShopError::NotFound("variant".to_string()))?;
            // Freeze the current price into the line; it is never re-read.
            order_items.push(OrderItem {
                id: None,
                order_id: None,
                variant_id: requested.variant_id,
                quantity: requested.quantity,
                price: variant.price,
            });
        }

        let now = Utc::now();
        let mut order = Order {
            id: None,
            user_id: Some(principal.user_id),
            address_id: Some(address_id),
            address_snapshot: None,
            status: OrderStatus::Pending,
            // Shipping is unconditionally free.
            shipping_cost: 0.0,
            delivery_date: now + Duration::days(DELIVERY_OFFSET_DAYS),
            created_at: now,
        };

        self.storage.place_order(&mut order, &mut order_items).await?;

        let order_id = order
            .id
            .ok_or_else(|| ShopError::Internal("order id missing after insert".to_string()))?;
        info!(
            "placed order {} for user {} with {} items",
            order_id,
            user.email,
            order_items.len()
        );

        self.build_view(order).await
    }

    /// Fetch one order, joined. Owner or admin only.
    pub async fn get_order(&self, principal: &Principal, order_id: Uuid) -> Result<OrderView> {
        let order = self
            .storage
            .get_order_by_id(order_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("order".to_string()))?;
        if !principal.is_admin() && order.user_id != Some(principal.user_id) {
            return Err(ShopError::Forbidden(
                "order belongs to another user".to_string(),
            ));
        }
        self.build_view(order).await
    }

    /// List a user's orders, joined and paginated. Owner or admin only.
    pub async fn list_orders_for_user(
        &self,
        principal: &Principal,
        user_id: Uuid,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<(Vec<OrderView>, usize)> {
        if !principal.is_admin() && user_id != principal.user_id {
            return Err(ShopError::Forbidden(
                "cannot list another user's orders".to_string(),
            ));
        }
        let orders = self
            .storage
            .get_orders_by_user(user_id, limit, offset)
            .await?;
        let total = self.storage.count_orders_by_user(user_id).await?;
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.build_view(order).await?);
        }
        Ok((views, total))
    }

    /// Update an order's status. Admin only (enforced at the route).
    ///
    /// Cancellation goes through the storage layer's atomic
    /// `cancel_order`, which flips the status and restores each item's
    /// quantity in one operation: only the call that actually transitions
    /// the order restores stock, so concurrent cancels (or a re-cancel)
    /// can never restore twice. Items whose variant has since been deleted
    /// are skipped.
    pub async fn update_status(&self, order_id: Uuid, status: &str) -> Result<OrderView> {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| ShopError::InvalidInput(format!("unknown order status '{status}'")))?;

        if status == OrderStatus::Cancelled {
            if self.storage.cancel_order(order_id).await? {
                info!("cancelled order {}, stock restored", order_id);
            }
        } else {
            self.storage.update_order_status(order_id, status).await?;
        }

        let updated = self
            .storage
            .get_order_by_id(order_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("order".to_string()))?;
        self.build_view(updated).await
    }

    /// Join an order with its items (live variant/product where present),
    /// its shipping address (live or frozen snapshot), and the derived
    /// total. The total is always computed from the frozen item prices,
    /// never stored.
    async fn build_view(&self, order: Order) -> Result<OrderView> {
        let order_id = order
            .id
            .ok_or_else(|| ShopError::Internal("order id missing".to_string()))?;
        let items = self.storage.get_order_items(order_id).await?;

        let mut item_views = Vec::with_capacity(items.len());
        let mut total = 0.0;
        for item in items {
            total += item.price * f64::from(item.quantity);
            let variant = self.storage.get_variant_by_id(item.variant_id).await?;
            let product = match &variant {
                Some(v) => self.storage.get_product_by_id(v.product_id).await?,
                None => None,
            };
            item_views.push(OrderItemView {
                item,
                variant,
                product,
            });
        }

        let address = match order.address_id {
            Some(address_id) => self
                .storage
                .get_address_by_id(address_id)
                .await?
                .map(|a| a.to_snapshot()),
            None => order.address_snapshot.clone(),
        };

        Ok(OrderView {
            order,
            items: item_views,
            address,
            total,
        })
    }
}
