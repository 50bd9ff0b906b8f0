pub mod token_manager;

pub use token_manager::{SecureTokenStore, TokenStore, mask_token};
