mod standard;
mod traits;

pub use standard::{Endpoint, StandardProvider};
pub use traits::{OAuthProvider, TokenSet};
