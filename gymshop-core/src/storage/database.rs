use super::traits::Storage;
use crate::common::error::{Result, ShopError};
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection, Database};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Manages the libSQL database handle. Uses a local file when
/// `GYMSHOP_DB_PATH` is set, otherwise connects to a remote Turso instance
/// via `LIBSQL_URL` and `LIBSQL_AUTH_TOKEN`.
pub struct DatabaseManager {
    db: Database,
}

fn db_err(message: String) -> ShopError {
    ShopError::Database { message }
}

impl DatabaseManager {
    pub async fn new() -> Result<Self> {
        if let Ok(path) = env::var("GYMSHOP_DB_PATH") {
            info!("Opening local database at {}", path);
            let db = Builder::new_local(path)
                .build()
                .await
                .map_err(|e| db_err(format!("Failed to open local database: {e}")))?;
            return Ok(Self { db });
        }

        let url = env::var("LIBSQL_URL").map_err(|_| {
            db_err("GYMSHOP_DB_PATH or LIBSQL_URL environment variable must be set".to_string())
        })?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN")
            .map_err(|_| db_err("LIBSQL_AUTH_TOKEN environment variable not set".to_string()))?;

        info!("Connecting to remote database at {}", url);
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| db_err(format!("Failed to connect to database: {e}")))?;
        Ok(Self { db })
    }

    pub fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| db_err(format!("Failed to get database connection: {e}")))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        let conn = self.get_connection()?;
        let migration_sql = include_str!("../../migrations/001_create_shop_tables.sql");
        conn.execute_batch(migration_sql)
            .await
            .map_err(|e| db_err(format!("Failed to run migrations: {e}")))?;
        info!("Database migrations completed successfully");
        Ok(())
    }
}

/// Database storage implementation backed by libSQL.
///
/// Stock reservation happens as a conditional `UPDATE ... WHERE stock >= ?`
/// inside a transaction, so two concurrent orders against the same variant
/// cannot both pass the check (the lost-update race of a read-then-write).
pub struct DatabaseStorage {
    db: Arc<DatabaseManager>,
}

impl DatabaseStorage {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db: Arc::new(db) }
    }
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| db_err(format!("Invalid {what} UUID: {e}")))
}

fn parse_timestamp(value: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| db_err(format!("Invalid {what} timestamp: {e}")))
}

fn get_text(row: &libsql::Row, idx: i32, what: &str) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| db_err(format!("Failed to read {what}: {e}")))
}

fn get_opt_text(row: &libsql::Row, idx: i32, what: &str) -> Result<Option<String>> {
    row.get::<Option<String>>(idx)
        .map_err(|e| db_err(format!("Failed to read {what}: {e}")))
}

fn get_f64(row: &libsql::Row, idx: i32, what: &str) -> Result<f64> {
    row.get::<f64>(idx)
        .map_err(|e| db_err(format!("Failed to read {what}: {e}")))
}

fn get_u32(row: &libsql::Row, idx: i32, what: &str) -> Result<u32> {
    let value = row
        .get::<i64>(idx)
        .map_err(|e| db_err(format!("Failed to read {what}: {e}")))?;
    u32::try_from(value).map_err(|_| db_err(format!("Negative value for {what}")))
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    let role_str = get_text(row, 2, "user role")?;
    Ok(User {
        id: Some(parse_uuid(&get_text(row, 0, "user id")?, "user")?),
        email: get_text(row, 1, "user email")?,
        role: Role::parse(&role_str)
            .ok_or_else(|| db_err(format!("Unknown role '{role_str}' in users table")))?,
        created_at: parse_timestamp(&get_text(row, 3, "user created_at")?, "user")?,
    })
}

fn row_to_product(row: &libsql::Row) -> Result<Product> {
    Ok(Product {
        id: Some(parse_uuid(&get_text(row, 0, "product id")?, "product")?),
        name: get_text(row, 1, "product name")?,
        description: get_opt_text(row, 2, "product description")?,
        category: get_opt_text(row, 3, "product category")?,
        image_url: get_opt_text(row, 4, "product image_url")?,
        created_at: parse_timestamp(&get_text(row, 5, "product created_at")?, "product")?,
    })
}

fn row_to_variant(row: &libsql::Row) -> Result<Variant> {
    Ok(Variant {
        id: Some(parse_uuid(&get_text(row, 0, "variant id")?, "variant")?),
        product_id: parse_uuid(&get_text(row, 1, "variant product_id")?, "variant product")?,
        name: get_text(row, 2, "variant name")?,
        price: get_f64(row, 3, "variant price")?,
        stock: get_u32(row, 4, "variant stock")?,
        created_at: parse_timestamp(&get_text(row, 5, "variant created_at")?, "variant")?,
    })
}

fn row_to_address(row: &libsql::Row) -> Result<Address> {
    Ok(Address {
        id: Some(parse_uuid(&get_text(row, 0, "address id")?, "address")?),
        user_id: parse_uuid(&get_text(row, 1, "address user_id")?, "address user")?,
        recipient: get_text(row, 2, "address recipient")?,
        street: get_text(row, 3, "address street")?,
        city: get_text(row, 4, "address city")?,
        postal_code: get_text(row, 5, "address postal_code")?,
        country: get_text(row, 6, "address country")?,
        created_at: parse_timestamp(&get_text(row, 7, "address created_at")?, "address")?,
    })
}

fn row_to_order(row: &libsql::Row) -> Result<Order> {
    let user_id = match get_opt_text(row, 1, "order user_id")? {
        Some(v) => Some(parse_uuid(&v, "order user")?),
        None => None,
    };
    let address_id = match get_opt_text(row, 2, "order address_id")? {
        Some(v) => Some(parse_uuid(&v, "order address")?),
        None => None,
    };
    let address_snapshot = match get_opt_text(row, 3, "order address_snapshot")? {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| db_err(format!("Failed to deserialize address snapshot: {e}")))?,
        ),
        None => None,
    };
    let status_str = get_text(row, 4, "order status")?;
    Ok(Order {
        id: Some(parse_uuid(&get_text(row, 0, "order id")?, "order")?),
        user_id,
        address_id,
        address_snapshot,
        status: OrderStatus::parse(&status_str)
            .ok_or_else(|| db_err(format!("Unknown status '{status_str}' in orders table")))?,
        shipping_cost: get_f64(row, 5, "order shipping_cost")?,
        delivery_date: parse_timestamp(&get_text(row, 6, "order delivery_date")?, "order")?,
        created_at: parse_timestamp(&get_text(row, 7, "order created_at")?, "order")?,
    })
}

fn row_to_order_item(row: &libsql::Row) -> Result<OrderItem> {
    Ok(OrderItem {
        id: Some(parse_uuid(&get_text(row, 0, "order item id")?, "order item")?),
        order_id: Some(parse_uuid(
            &get_text(row, 1, "order item order_id")?,
            "order item order",
        )?),
        variant_id: parse_uuid(
            &get_text(row, 2, "order item variant_id")?,
            "order item variant",
        )?,
        quantity: get_u32(row, 3, "order item quantity")?,
        price: get_f64(row, 4, "order item price")?,
    })
}

const USER_COLUMNS: &str = "id, email, role, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, category, image_url, created_at";
const VARIANT_COLUMNS: &str = "id, product_id, name, price, stock, created_at";
const ADDRESS_COLUMNS: &str =
    "id, user_id, recipient, street, city, postal_code, country, created_at";
const ORDER_COLUMNS: &str =
    "id, user_id, address_id, address_snapshot, status, shipping_cost, delivery_date, created_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, variant_id, quantity, price";

impl DatabaseStorage {
    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<usize> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| db_err(format!("Failed to count rows: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read count: {e}")))?
            .ok_or_else(|| db_err("Count query returned no rows".to_string()))?;
        let count = row
            .get::<i64>(0)
            .map_err(|e| db_err(format!("Failed to read count: {e}")))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn create_user(&self, user: &mut User) -> Result<()> {
        let id = user.id.unwrap_or_else(Uuid::new_v4);
        user.id = Some(id);

        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO users (id, email, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                user.email.clone(),
                user.role.as_str(),
                user.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to insert user: {e}")))?;
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query user: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read user row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
                params![email],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query user by email: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read user row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_all_users(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<User>> {
        let conn = self.db.get_connection()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let offset = offset.unwrap_or(0) as i64;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY created_at LIMIT ?1 OFFSET ?2"
                ),
                params![limit, offset],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query users: {e}")))?;
        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read user row: {e}")))?
        {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn count_users(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM users", ()).await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM users WHERE id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to delete user: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("user".to_string()));
        }
        Ok(())
    }

    async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO credentials (user_id, password_hash, password_salt) VALUES (?1, ?2, ?3)",
            params![
                credential.user_id.to_string(),
                credential.password_hash.clone(),
                credential.password_salt.clone()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to upsert credential: {e}")))?;
        Ok(())
    }

    async fn get_credential(&self, user_id: Uuid) -> Result<Option<Credential>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT user_id, password_hash, password_salt FROM credentials WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query credential: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read credential row: {e}")))?
        {
            Some(row) => Ok(Some(Credential {
                user_id: parse_uuid(&get_text(&row, 0, "credential user_id")?, "credential")?,
                password_hash: get_text(&row, 1, "credential hash")?,
                password_salt: get_text(&row, 2, "credential salt")?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_credential(&self, user_id: Uuid) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM credentials WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to delete credential: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("credential".to_string()));
        }
        Ok(())
    }

    async fn create_product(&self, product: &mut Product) -> Result<()> {
        let id = product.id.unwrap_or_else(Uuid::new_v4);
        product.id = Some(id);

        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO products (id, name, description, category, image_url, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                product.name.clone(),
                product.description.clone(),
                product.category.clone(),
                product.image_url.clone(),
                product.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to insert product: {e}")))?;
        Ok(())
    }

    async fn get_product_by_id(&self, product_id: Uuid) -> Result<Option<Product>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![product_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query product: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read product row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_product(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_all_products(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Product>> {
        let conn = self.db.get_connection()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let offset = offset.unwrap_or(0) as i64;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at LIMIT ?1 OFFSET ?2"
                ),
                params![limit, offset],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query products: {e}")))?;
        let mut products = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read product row: {e}")))?
        {
            products.push(row_to_product(&row)?);
        }
        Ok(products)
    }

    async fn count_products(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM products", ()).await
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let id = product
            .id
            .ok_or_else(|| ShopError::InvalidInput("product id missing".to_string()))?;
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE products SET name = ?2, description = ?3, category = ?4, image_url = ?5 \
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    product.name.clone(),
                    product.description.clone(),
                    product.category.clone(),
                    product.image_url.clone()
                ],
            )
            .await
            .map_err(|e| db_err(format!("Failed to update product: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("product".to_string()));
        }
        Ok(())
    }

    async fn delete_product(&self, product_id: Uuid) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM products WHERE id = ?1",
                params![product_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to delete product: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("product".to_string()));
        }
        Ok(())
    }

    async fn create_variant(&self, variant: &mut Variant) -> Result<()> {
        let id = variant.id.unwrap_or_else(Uuid::new_v4);
        variant.id = Some(id);

        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO variants (id, product_id, name, price, stock, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                variant.product_id.to_string(),
                variant.name.clone(),
                variant.price,
                variant.stock as i64,
                variant.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to insert variant: {e}")))?;
        Ok(())
    }

    async fn get_variant_by_id(&self, variant_id: Uuid) -> Result<Option<Variant>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ?1"),
                params![variant_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query variant: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read variant row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_variant(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_variants_by_product(&self, product_id: Uuid) -> Result<Vec<Variant>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {VARIANT_COLUMNS} FROM variants WHERE product_id = ?1 \
                     ORDER BY created_at"
                ),
                params![product_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query variants: {e}")))?;
        let mut variants = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read variant row: {e}")))?
        {
            variants.push(row_to_variant(&row)?);
        }
        Ok(variants)
    }

    async fn update_variant(&self, variant: &Variant) -> Result<()> {
        let id = variant
            .id
            .ok_or_else(|| ShopError::InvalidInput("variant id missing".to_string()))?;
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE variants SET name = ?2, price = ?3, stock = ?4 WHERE id = ?1",
                params![
                    id.to_string(),
                    variant.name.clone(),
                    variant.price,
                    variant.stock as i64
                ],
            )
            .await
            .map_err(|e| db_err(format!("Failed to update variant: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("variant".to_string()));
        }
        Ok(())
    }

    async fn delete_variant(&self, variant_id: Uuid) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM variants WHERE id = ?1",
                params![variant_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to delete variant: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("variant".to_string()));
        }
        Ok(())
    }

    async fn create_address(&self, address: &mut Address) -> Result<()> {
        let id = address.id.unwrap_or_else(Uuid::new_v4);
        address.id = Some(id);

        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO addresses (id, user_id, recipient, street, city, postal_code, country, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                address.user_id.to_string(),
                address.recipient.clone(),
                address.street.clone(),
                address.city.clone(),
                address.postal_code.clone(),
                address.country.clone(),
                address.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to insert address: {e}")))?;
        Ok(())
    }

    async fn get_address_by_id(&self, address_id: Uuid) -> Result<Option<Address>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = ?1"),
                params![address_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query address: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read address row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_address(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_addresses_by_user(&self, user_id: Uuid) -> Result<Vec<Address>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = ?1 \
                     ORDER BY created_at"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query addresses: {e}")))?;
        let mut addresses = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read address row: {e}")))?
        {
            addresses.push(row_to_address(&row)?);
        }
        Ok(addresses)
    }

    async fn update_address(&self, address: &Address) -> Result<()> {
        let id = address
            .id
            .ok_or_else(|| ShopError::InvalidInput("address id missing".to_string()))?;
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE addresses SET recipient = ?2, street = ?3, city = ?4, postal_code = ?5, \
                 country = ?6 WHERE id = ?1",
                params![
                    id.to_string(),
                    address.recipient.clone(),
                    address.street.clone(),
                    address.city.clone(),
                    address.postal_code.clone(),
                    address.country.clone()
                ],
            )
            .await
            .map_err(|e| db_err(format!("Failed to update address: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("address".to_string()));
        }
        Ok(())
    }

    async fn delete_address(&self, address_id: Uuid) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM addresses WHERE id = ?1",
                params![address_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to delete address: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("address".to_string()));
        }
        Ok(())
    }

    async fn snapshot_order_addresses(
        &self,
        address_id: Uuid,
        snapshot: &AddressSnapshot,
    ) -> Result<u64> {
        let snapshot_json = serde_json::to_string(snapshot)
            .map_err(|e| db_err(format!("Failed to serialize address snapshot: {e}")))?;
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE orders SET address_snapshot = ?2, address_id = NULL WHERE address_id = ?1",
                params![address_id.to_string(), snapshot_json],
            )
            .await
            .map_err(|e| db_err(format!("Failed to snapshot order addresses: {e}")))?;
        Ok(affected)
    }

    async fn place_order(&self, order: &mut Order, items: &mut [OrderItem]) -> Result<()> {
        let order_id = order.id.unwrap_or_else(Uuid::new_v4);
        order.id = Some(order_id);
        for item in items.iter_mut() {
            item.id = Some(item.id.unwrap_or_else(Uuid::new_v4));
            item.order_id = Some(order_id);
        }

        let conn = self.db.get_connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| db_err(format!("Failed to begin transaction: {e}")))?;

        // Conditional decrement: zero affected rows means the variant is
        // missing or its stock is short. Either way the transaction rolls
        // back and nothing is written.
        for item in items.iter() {
            let affected = tx
                .execute(
                    "UPDATE variants SET stock = stock - ?2 WHERE id = ?1 AND stock >= ?2",
                    params![item.variant_id.to_string(), item.quantity as i64],
                )
                .await
                .map_err(|e| db_err(format!("Failed to reserve stock: {e}")))?;
            if affected == 0 {
                let mut rows = tx
                    .query(
                        "SELECT stock FROM variants WHERE id = ?1",
                        params![item.variant_id.to_string()],
                    )
                    .await
                    .map_err(|e| db_err(format!("Failed to query variant stock: {e}")))?;
                let available = match rows
                    .next()
                    .await
                    .map_err(|e| db_err(format!("Failed to read variant stock: {e}")))?
                {
                    Some(row) => Some(
                        row.get::<i64>(0)
                            .map_err(|e| db_err(format!("Failed to read variant stock: {e}")))?
                            as u32,
                    ),
                    None => None,
                };
                tx.rollback()
                    .await
                    .map_err(|e| db_err(format!("Failed to roll back: {e}")))?;
                return Err(match available {
                    Some(available) => ShopError::InsufficientStock {
                        variant_id: item.variant_id,
                        requested: item.quantity,
                        available,
                    },
                    None => ShopError::NotFound("variant".to_string()),
                });
            }
        }

        let snapshot_json = match &order.address_snapshot {
            Some(snapshot) => Some(
                serde_json::to_string(snapshot)
                    .map_err(|e| db_err(format!("Failed to serialize address snapshot: {e}")))?,
            ),
            None => None,
        };
        tx.execute(
            "INSERT INTO orders (id, user_id, address_id, address_snapshot, status, shipping_cost, delivery_date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order_id.to_string(),
                order.user_id.map(|u| u.to_string()),
                order.address_id.map(|a| a.to_string()),
                snapshot_json,
                order.status.as_str(),
                order.shipping_cost,
                order.delivery_date.to_rfc3339(),
                order.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| db_err(format!("Failed to insert order: {e}")))?;

        for item in items.iter() {
            tx.execute(
                "INSERT INTO order_items (id, order_id, variant_id, quantity, price) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    item.id.map(|i| i.to_string()),
                    order_id.to_string(),
                    item.variant_id.to_string(),
                    item.quantity as i64,
                    item.price
                ],
            )
            .await
            .map_err(|e| db_err(format!("Failed to insert order item: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_err(format!("Failed to commit order: {e}")))?;
        debug!("placed order {} with {} items", order_id, items.len());
        Ok(())
    }

    async fn get_order_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![order_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query order: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read order row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_order(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let conn = self.db.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ?1"),
                params![order_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query order items: {e}")))?;
        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read order item row: {e}")))?
        {
            items.push(row_to_order_item(&row)?);
        }
        Ok(items)
    }

    async fn get_orders_by_user(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Order>> {
        let conn = self.db.get_connection()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let offset = offset.unwrap_or(0) as i64;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 \
                     ORDER BY created_at LIMIT ?2 OFFSET ?3"
                ),
                params![user_id.to_string(), limit, offset],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query orders: {e}")))?;
        let mut orders = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read order row: {e}")))?
        {
            orders.push(row_to_order(&row)?);
        }
        Ok(orders)
    }

    async fn count_orders_by_user(&self, user_id: Uuid) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM orders WHERE user_id = ?1",
            params![user_id.to_string()],
        )
        .await
    }

    async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<()> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE orders SET status = ?2 WHERE id = ?1",
                params![order_id.to_string(), status.as_str()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to update order status: {e}")))?;
        if affected == 0 {
            return Err(ShopError::NotFound("order".to_string()));
        }
        Ok(())
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<bool> {
        let conn = self.db.get_connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| db_err(format!("Failed to begin transaction: {e}")))?;

        // Conditional flip: zero affected rows means the order is either
        // missing or already cancelled, and in both cases no stock moves.
        let affected = tx
            .execute(
                "UPDATE orders SET status = 'cancelled' WHERE id = ?1 AND status != 'cancelled'",
                params![order_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to cancel order: {e}")))?;
        if affected == 0 {
            let mut rows = tx
                .query(
                    "SELECT 1 FROM orders WHERE id = ?1",
                    params![order_id.to_string()],
                )
                .await
                .map_err(|e| db_err(format!("Failed to query order: {e}")))?;
            let exists = rows
                .next()
                .await
                .map_err(|e| db_err(format!("Failed to read order row: {e}")))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| db_err(format!("Failed to roll back: {e}")))?;
            return if exists {
                Ok(false)
            } else {
                Err(ShopError::NotFound("order".to_string()))
            };
        }

        let mut rows = tx
            .query(
                "SELECT variant_id, quantity FROM order_items WHERE order_id = ?1",
                params![order_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to query order items: {e}")))?;
        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err(format!("Failed to read order item row: {e}")))?
        {
            let variant_id = parse_uuid(&get_text(&row, 0, "order item variant_id")?, "variant")?;
            let quantity = get_u32(&row, 1, "order item quantity")?;
            items.push((variant_id, quantity));
        }

        for (variant_id, quantity) in items {
            let restored = tx
                .execute(
                    "UPDATE variants SET stock = stock + ?2 WHERE id = ?1",
                    params![variant_id.to_string(), quantity as i64],
                )
                .await
                .map_err(|e| db_err(format!("Failed to restore stock: {e}")))?;
            if restored == 0 {
                warn!(
                    "variant {} no longer exists, skipping stock restore for order {}",
                    variant_id, order_id
                );
            }
        }

        tx.commit()
            .await
            .map_err(|e| db_err(format!("Failed to commit cancellation: {e}")))?;
        debug!("cancelled order {} and restored stock", order_id);
        Ok(true)
    }

    async fn anonymize_orders_for_user(&self, user_id: Uuid) -> Result<u64> {
        let conn = self.db.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE orders SET user_id = NULL WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| db_err(format!("Failed to anonymize orders: {e}")))?;
        Ok(affected)
    }
}
