pub mod address;
pub mod order;
pub mod product;
pub mod user;
pub mod variant;

pub use address::AddressService;
pub use order::{NewOrderItem, OrderService};
pub use product::ProductService;
pub use user::{AccountDeletion, UserService};
pub use variant::VariantService;
