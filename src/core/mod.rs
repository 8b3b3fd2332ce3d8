//! Core traits, constants, and error types.

pub mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
