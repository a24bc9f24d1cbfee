use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use gymshop_core::auth::{Principal, TokenAuthority};
use gymshop_core::services::{
    AddressService, NewOrderItem, OrderService, ProductService, UserService, VariantService,
};
use gymshop_core::storage::{InMemoryStorage, Storage};
use gymshop_core::{
    Address, OrderStatus, Product, Role, ShopError, User, Variant,
};
use uuid::Uuid;

struct Shop {
    storage: Arc<InMemoryStorage>,
    orders: OrderService,
    addresses: AddressService,
    users: UserService,
}

impl Shop {
    fn new() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let tokens = Arc::new(TokenAuthority::new("test-secret", 3600).unwrap());
        Self {
            orders: OrderService::new(storage.clone()),
            addresses: AddressService::new(storage.clone()),
            users: UserService::new(storage.clone(), tokens),
            storage,
        }
    }

    async fn seed_customer(&self) -> Result<(Principal, Uuid)> {
        let now = Utc::now();
        let mut user = User {
            id: None,
            email: format!("{}@example.com", Uuid::new_v4()),
            role: Role::Customer,
            created_at: now,
        };
        self.storage.create_user(&mut user).await?;
        let user_id = user.id.unwrap();

        let mut address = Address {
            id: None,
            user_id,
            recipient: "A. Lifter".to_string(),
            street: "1 Barbell Way".to_string(),
            city: "Spokane".to_string(),
            postal_code: "99201".to_string(),
            country: "US".to_string(),
            created_at: now,
        };
        self.storage.create_address(&mut address).await?;

        Ok((
            Principal {
                user_id,
                role: Role::Customer,
            },
            address.id.unwrap(),
        ))
    }

    async fn seed_variant(&self, price: f64, stock: u32) -> Result<Uuid> {
        let now = Utc::now();
        let mut product = Product {
            id: None,
            name: "Whey Protein".to_string(),
            description: None,
            category: Some("supplements".to_string()),
            image_url: None,
            created_at: now,
        };
        self.storage.create_product(&mut product).await?;
        let mut variant = Variant {
            id: None,
            product_id: product.id.unwrap(),
            name: "Vanilla / 2kg".to_string(),
            price,
            stock,
            created_at: now,
        };
        self.storage.create_variant(&mut variant).await?;
        Ok(variant.id.unwrap())
    }

    async fn stock_of(&self, variant_id: Uuid) -> Result<u32> {
        Ok(self
            .storage
            .get_variant_by_id(variant_id)
            .await?
            .expect("variant exists")
            .stock)
    }
}

#[tokio::test]
async fn creation_decrements_stock_by_ordered_quantity() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 10).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 4,
            }],
        )
        .await?;

    assert_eq!(view.order.status, OrderStatus::Pending);
    assert_eq!(view.order.shipping_cost, 0.0);
    assert_eq!(view.items.len(), 1);
    assert_eq!(shop.stock_of(variant_id).await?, 6);
    Ok(())
}

#[tokio::test]
async fn over_quantity_fails_and_leaves_stock_unchanged() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let err = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 6,
            }],
        )
        .await
        .unwrap_err();

    match err {
        ShopError::InsufficientStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 6);
            assert_eq!(available, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(shop.stock_of(variant_id).await?, 5);
    // No partial state: the user has no orders.
    assert_eq!(
        shop.storage
            .count_orders_by_user(principal.user_id)
            .await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn shortfall_in_one_item_rolls_back_the_whole_order() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let plenty = shop.seed_variant(10.0, 100).await?;
    let scarce = shop.seed_variant(10.0, 1).await?;

    let err = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[
                NewOrderItem {
                    variant_id: plenty,
                    quantity: 2,
                },
                NewOrderItem {
                    variant_id: scarce,
                    quantity: 2,
                },
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ShopError::InsufficientStock { .. }));
    assert_eq!(shop.stock_of(plenty).await?, 100);
    assert_eq!(shop.stock_of(scarce).await?, 1);
    Ok(())
}

#[tokio::test]
async fn cancel_restores_stock_exactly_once() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    // stock 5 -> order qty 3 -> stock 2, pending
    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 3,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();
    assert_eq!(shop.stock_of(variant_id).await?, 2);
    assert_eq!(view.order.status, OrderStatus::Pending);

    // cancel -> stock back to 5, cancelled
    let cancelled = shop.orders.update_status(order_id, "cancelled").await?;
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(shop.stock_of(variant_id).await?, 5);

    // cancel again -> stock unchanged (idempotent)
    let again = shop.orders.update_status(order_id, "cancelled").await?;
    assert_eq!(again.order.status, OrderStatus::Cancelled);
    assert_eq!(shop.stock_of(variant_id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn non_cancel_transitions_do_not_touch_stock() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 3,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();

    let shipped = shop.orders.update_status(order_id, "shipped").await?;
    assert_eq!(shipped.order.status, OrderStatus::Shipped);
    assert_eq!(shop.stock_of(variant_id).await?, 2);
    Ok(())
}

#[tokio::test]
async fn order_total_is_frozen_against_price_changes() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(20.0, 10).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 2,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();
    assert_eq!(view.total, 40.0);

    // Reprice the live variant; the order's derived total must not move.
    let mut variant = shop
        .storage
        .get_variant_by_id(variant_id)
        .await?
        .unwrap();
    variant.price = 99.0;
    shop.storage.update_variant(&variant).await?;

    let refetched = shop.orders.get_order(&principal, order_id).await?;
    assert_eq!(refetched.total, 40.0);
    assert_eq!(refetched.items[0].item.price, 20.0);
    Ok(())
}

#[tokio::test]
async fn concurrent_orders_cannot_both_reserve_scarce_stock() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let a = {
        let orders = shop.orders.clone();
        tokio::spawn(async move {
            orders
                .create_order(
                    &principal,
                    address_id,
                    &[NewOrderItem {
                        variant_id,
                        quantity: 3,
                    }],
                )
                .await
        })
    };
    let b = {
        let orders = shop.orders.clone();
        tokio::spawn(async move {
            orders
                .create_order(
                    &principal,
                    address_id,
                    &[NewOrderItem {
                        variant_id,
                        quantity: 3,
                    }],
                )
                .await
        })
    };

    let results = [a.await?, b.await?];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the two orders may succeed");
    assert_eq!(shop.stock_of(variant_id).await?, 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_cancels_restore_stock_exactly_once() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 3,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();
    assert_eq!(shop.stock_of(variant_id).await?, 2);

    // Many racing cancels of the same order: only the one that actually
    // transitions the status may restore stock.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orders = shop.orders.clone();
        tasks.push(tokio::spawn(async move {
            orders.update_status(order_id, "cancelled").await
        }));
    }
    for task in tasks {
        let view = task.await??;
        assert_eq!(view.order.status, OrderStatus::Cancelled);
    }

    assert_eq!(shop.stock_of(variant_id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn storage_cancel_transitions_at_most_once() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 3,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();

    assert!(shop.storage.cancel_order(order_id).await?);
    assert!(!shop.storage.cancel_order(order_id).await?);
    assert_eq!(shop.stock_of(variant_id).await?, 5);

    let missing = shop.storage.cancel_order(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(ShopError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn deleting_a_referenced_address_freezes_a_snapshot() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 1,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();
    let before = view.address.clone().expect("live address resolved");

    shop.addresses.delete_address(&principal, address_id).await?;

    let after = shop.orders.get_order(&principal, order_id).await?;
    assert_eq!(after.order.address_id, None);
    assert_eq!(after.address, Some(before));
    assert!(shop
        .storage
        .get_address_by_id(address_id)
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn foreign_address_is_rejected() -> Result<()> {
    let shop = Shop::new();
    let (principal, _own_address) = shop.seed_customer().await?;
    let (_other, other_address) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let err = shop
        .orders
        .create_order(
            &principal,
            other_address,
            &[NewOrderItem {
                variant_id,
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::InvalidRelation(_)));
    Ok(())
}

#[tokio::test]
async fn zero_quantity_is_rejected() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let err = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 0,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::InvalidInput(_)));
    assert_eq!(shop.stock_of(variant_id).await?, 5);
    Ok(())
}

#[tokio::test]
async fn account_deletion_detaches_addresses_and_anonymizes_orders() -> Result<()> {
    let shop = Shop::new();
    let (principal, address_id) = shop.seed_customer().await?;
    let variant_id = shop.seed_variant(19.99, 5).await?;

    let view = shop
        .orders
        .create_order(
            &principal,
            address_id,
            &[NewOrderItem {
                variant_id,
                quantity: 1,
            }],
        )
        .await?;
    let order_id = view.order.id.unwrap();

    // The seeded customer has no credential row, so revocation reports a
    // partial success while the local data is still fully removed.
    let outcome = shop.users.delete_account(&principal).await?;
    assert!(!outcome.credentials_revoked);

    assert!(shop
        .storage
        .get_user_by_id(principal.user_id)
        .await?
        .is_none());
    assert!(shop
        .storage
        .get_address_by_id(address_id)
        .await?
        .is_none());
    let order = shop
        .storage
        .get_order_by_id(order_id)
        .await?
        .expect("order kept for bookkeeping");
    assert_eq!(order.user_id, None);
    assert!(order.address_snapshot.is_some());
    Ok(())
}
