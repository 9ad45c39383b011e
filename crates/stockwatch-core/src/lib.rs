//! Shared vocabulary for Stockwatch: tickers, watchlists, sessions, the error
//! taxonomy and the async trait seams implemented by the store and identity
//! crates.

pub mod error;
pub mod traits;
pub mod types;
pub mod validation;

pub use error::*;
pub use traits::*;
pub use types::*;
