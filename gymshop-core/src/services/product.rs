use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::common::error::{Result, ShopError};
use crate::domain::*;
use crate::storage::Storage;

#[derive(Debug, Clone, Default)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct ProductService {
    storage: Arc<dyn Storage>,
}

impl ProductService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        if input.name.trim().is_empty() {
            return Err(ShopError::InvalidInput(
                "product name must not be empty".to_string(),
            ));
        }
        let mut product = Product {
            id: None,
            name: input.name.trim().to_string(),
            description: input.description,
            category: input.category,
            image_url: input.image_url,
            created_at: Utc::now(),
        };
        self.storage.create_product(&mut product).await?;
        info!("created product {}", product.name);
        Ok(product)
    }

    /// Product joined with its variants.
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductView> {
        let product = self
            .storage
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("product".to_string()))?;
        let variants = self.storage.get_variants_by_product(product_id).await?;
        Ok(ProductView { product, variants })
    }

    pub async fn list_products(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<(Vec<Product>, usize)> {
        let products = self.storage.get_all_products(limit, offset).await?;
        let total = self.storage.count_products().await?;
        Ok((products, total))
    }

    pub async fn update_product(&self, product_id: Uuid, input: ProductInput) -> Result<Product> {
        if input.name.trim().is_empty() {
            return Err(ShopError::InvalidInput(
                "product name must not be empty".to_string(),
            ));
        }
        let mut product = self
            .storage
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("product".to_string()))?;
        product.name = input.name.trim().to_string();
        product.description = input.description;
        product.category = input.category;
        product.image_url = input.image_url;
        self.storage.update_product(&product).await?;
        Ok(product)
    }

    /// Delete a product and all of its variants.
    pub async fn delete_product(&self, product_id: Uuid) -> Result<()> {
        let product = self
            .storage
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("product".to_string()))?;
        for variant in self.storage.get_variants_by_product(product_id).await? {
            if let Some(variant_id) = variant.id {
                self.storage.delete_variant(variant_id).await?;
            }
        }
        self.storage.delete_product(product_id).await?;
        info!("deleted product {} and its variants", product.name);
        Ok(())
    }
}
