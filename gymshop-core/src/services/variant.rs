use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::common::error::{Result, ShopError};
use crate::domain::*;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct VariantInput {
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

#[derive(Clone)]
pub struct VariantService {
    storage: Arc<dyn Storage>,
}

impl VariantService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn validate(input: &VariantInput) -> Result<()> {
        if input.name.trim().is_empty() {
            return Err(ShopError::InvalidInput(
                "variant name must not be empty".to_string(),
            ));
        }
        if !input.price.is_finite() || input.price < 0.0 {
            return Err(ShopError::InvalidInput(
                "variant price must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_variant(&self, product_id: Uuid, input: VariantInput) -> Result<Variant> {
        Self::validate(&input)?;
        if self.storage.get_product_by_id(product_id).await?.is_none() {
            return Err(ShopError::InvalidRelation(
                "variant references a missing product".to_string(),
            ));
        }
        let mut variant = Variant {
            id: None,
            product_id,
            name: input.name.trim().to_string(),
            price: input.price,
            stock: input.stock,
            created_at: Utc::now(),
        };
        self.storage.create_variant(&mut variant).await?;
        info!(
            "created variant {} for product {}",
            variant.name, product_id
        );
        Ok(variant)
    }

    pub async fn get_variant(&self, variant_id: Uuid) -> Result<Variant> {
        self.storage
            .get_variant_by_id(variant_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("variant".to_string()))
    }

    pub async fn list_for_product(&self, product_id: Uuid) -> Result<Vec<Variant>> {
        if self.storage.get_product_by_id(product_id).await?.is_none() {
            return Err(ShopError::NotFound("product".to_string()));
        }
        self.storage.get_variants_by_product(product_id).await
    }

    /// Admin update: rename, reprice, or restock. This is the only stock
    /// mutation outside the order lifecycle.
    pub async fn update_variant(&self, variant_id: Uuid, input: VariantInput) -> Result<Variant> {
        Self::validate(&input)?;
        let mut variant = self.get_variant(variant_id).await?;
        variant.name = input.name.trim().to_string();
        variant.price = input.price;
        variant.stock = input.stock;
        self.storage.update_variant(&variant).await?;
        Ok(variant)
    }

    pub async fn delete_variant(&self, variant_id: Uuid) -> Result<()> {
        self.storage.delete_variant(variant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn variant_requires_existing_product() {
        let storage = Arc::new(InMemoryStorage::new());
        let variants = VariantService::new(storage);
        let err = variants
            .create_variant(
                Uuid::new_v4(),
                VariantInput {
                    name: "Black / M".to_string(),
                    price: 29.99,
                    stock: 10,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidRelation(_)));
    }

    #[tokio::test]
    async fn negative_price_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        let variants = VariantService::new(storage);
        let err = variants
            .create_variant(
                Uuid::new_v4(),
                VariantInput {
                    name: "Black / M".to_string(),
                    price: -1.0,
                    stock: 10,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidInput(_)));
    }
}
