//! Data models for the application

mod api_key;
mod expiry;
mod listing;
mod paste;
mod response;
mod shortlink;
mod storage;

pub use api_key::*;
pub use expiry::*;
pub use listing::*;
pub use paste::*;
pub use response::*;
pub use shortlink::*;
pub use storage::*;
