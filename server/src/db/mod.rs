pub mod memory;
pub mod models;
pub mod mongo;
pub mod repository;

pub use memory::{InMemoryTokenStore, InMemoryUserStore};
pub use models::{Role, TokenRecord, User};
pub use mongo::MongoDbContext;
pub use repository::{StoreError, StoreResult, TokenStore, UserPage, UserQuery, UserStore};
