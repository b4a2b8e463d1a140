//! Context Provider Client
//!
//! HTTP client for the vault-api data provider:
//! - `client`: fetches the context document with the localhost fallback
//! - `helpers`: URL normalization and fallback rewriting
//! - `error`: failure taxonomy of provider requests

pub mod client;
pub mod error;
pub mod helpers;

pub use client::{ContextClient, ContextDocument};
pub use error::ProviderError;
