pub mod registry;
pub mod serializer;
pub mod tester;
pub mod transfer;

pub use registry::*;
pub use tester::*;
pub use transfer::{ImportReport, SkippedRecord};
