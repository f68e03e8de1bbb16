pub mod client;
pub mod error;
pub mod keystore;

pub use error::ControllerError;
