pub mod addresses;
pub mod auth;
pub mod orders;
pub mod products;
pub mod users;
pub mod variants;

use serde::Deserialize;

/// Common `?limit=&offset=` query parameters for paginated list routes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
