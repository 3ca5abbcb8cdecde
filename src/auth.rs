//! Credential material, bearer token models, and private-key assertions.

pub mod assertion;
pub mod credentials;
pub mod secret;
pub mod token;

pub use assertion::*;
pub use credentials::*;
pub use secret::*;
pub use token::*;
