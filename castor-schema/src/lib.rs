pub mod continuation;
pub mod location;

pub use continuation::{ContinuationToken, DecodeError};
pub use location::{LocationMode, ParseLocationModeError, StorageLocation};
