pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod model;
pub mod rate_limit;
pub mod retry;
pub mod state_machine;
pub mod store;
pub mod traits;

pub use error::*;
pub use model::*;
pub use rate_limit::*;
pub use retry::*;
pub use state_machine::*;
pub use store::*;
pub use traits::*;
