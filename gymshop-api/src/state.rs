use std::sync::Arc;

use gymshop_core::auth::TokenAuthority;
use gymshop_core::services::{
    AddressService, OrderService, ProductService, UserService, VariantService,
};
use gymshop_core::storage::Storage;

/// Shared application state: one service per entity, all backed by the same
/// explicitly constructed storage, plus the token authority.
pub struct AppState {
    pub users: UserService,
    pub products: ProductService,
    pub variants: VariantService,
    pub addresses: AddressService,
    pub orders: OrderService,
    pub tokens: Arc<TokenAuthority>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, tokens: Arc<TokenAuthority>) -> Self {
        Self {
            users: UserService::new(storage.clone(), tokens.clone()),
            products: ProductService::new(storage.clone()),
            variants: VariantService::new(storage.clone()),
            addresses: AddressService::new(storage.clone()),
            orders: OrderService::new(storage),
            tokens,
        }
    }
}
