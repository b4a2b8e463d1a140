//! Vault Domain Module
//!
//! The vault-api data provider, serving the user-context document:
//! - Domain models (UserContext and its sections)
//! - Provider state (the document being served)
//! - REST API handlers

pub mod handlers;
pub mod models;
pub mod state;

// Re-export commonly used types for convenience
pub use handlers::routes;
pub use models::UserContext;
pub use state::{SharedVaultState, VaultError, VaultState};
