pub mod error;
pub mod store;
pub mod updates;

pub use error::{Result, StoreError};
pub use store::{Account, Profile, Store};
pub use updates::{UserUpdate, MAX_UPDATES};
