use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::common::error::{Result, ShopError};
use crate::domain::*;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct AddressInput {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Clone)]
pub struct AddressService {
    storage: Arc<dyn Storage>,
}

impl AddressService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn validate(input: &AddressInput) -> Result<()> {
        let fields = [
            ("recipient", &input.recipient),
            ("street", &input.street),
            ("city", &input.city),
            ("postal code", &input.postal_code),
            ("country", &input.country),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ShopError::InvalidInput(format!(
                    "address {name} must not be empty"
                )));
            }
        }
        Ok(())
    }

    async fn owned_address(&self, principal: &Principal, address_id: Uuid) -> Result<Address> {
        let address = self
            .storage
            .get_address_by_id(address_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("address".to_string()))?;
        if !principal.is_admin() && address.user_id != principal.user_id {
            return Err(ShopError::InvalidRelation(
                "address belongs to another user".to_string(),
            ));
        }
        Ok(address)
    }

    pub async fn create_address(
        &self,
        principal: &Principal,
        input: AddressInput,
    ) -> Result<Address> {
        Self::validate(&input)?;
        let mut address = Address {
            id: None,
            user_id: principal.user_id,
            recipient: input.recipient.trim().to_string(),
            street: input.street.trim().to_string(),
            city: input.city.trim().to_string(),
            postal_code: input.postal_code.trim().to_string(),
            country: input.country.trim().to_string(),
            created_at: Utc::now(),
        };
        self.storage.create_address(&mut address).await?;
        Ok(address)
    }

    pub async fn list_addresses(&self, principal: &Principal) -> Result<Vec<Address>> {
        self.storage.get_addresses_by_user(principal.user_id).await
    }

    pub async fn update_address(
        &self,
        principal: &Principal,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<Address> {
        Self::validate(&input)?;
        let mut address = self.owned_address(principal, address_id).await?;
        address.recipient = input.recipient.trim().to_string();
        address.street = input.street.trim().to_string();
        address.city = input.city.trim().to_string();
        address.postal_code = input.postal_code.trim().to_string();
        address.country = input.country.trim().to_string();
        self.storage.update_address(&address).await?;
        Ok(address)
    }

    /// Delete an address. Any order still referencing it gets a frozen copy
    /// of the fields first, so historical orders keep displaying after the
    /// row is gone.
    pub async fn delete_address(&self, principal: &Principal, address_id: Uuid) -> Result<()> {
        let address = self.owned_address(principal, address_id).await?;
        let touched = self
            .storage
            .snapshot_order_addresses(address_id, &address.to_snapshot())
            .await?;
        if touched > 0 {
            info!(
                "froze address {} onto {} order(s) before deletion",
                address_id, touched
            );
        }
        self.storage.delete_address(address_id).await
    }
}
