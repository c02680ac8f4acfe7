pub mod connection_validator;

pub use connection_validator::*;
