pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod validation;

pub use error::{DecodeError, RegistryError, StorageError};
pub use models::*;
pub use services::*;
pub use validation::*;
