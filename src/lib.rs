pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod utils;

pub use error::{PricingError, PricingResult};
pub use models::*;
pub use utils::*;
