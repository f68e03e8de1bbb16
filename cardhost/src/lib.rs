pub mod client;
pub mod config;
pub mod error;
pub mod platform;

pub use config::{CardhostConfig, Identity};
pub use error::CardhostError;
pub use platform::{MockSmartCardPlatform, SmartCardPlatform};
