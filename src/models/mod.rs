pub mod connection;
pub mod envelope;
pub mod stats;
pub mod timestamp;

pub use connection::*;
pub use envelope::*;
pub use stats::*;
pub use timestamp::LastTested;
