//! Shared wire protocol and crypto primitives for the card relay.
//!
//! This crate is the single source of truth for everything that must
//! stay byte-identical between the Router and both peer kinds:
//! [`identity`] (peer id derivation), [`canonical`] (the signing
//! pre-image), [`signature`] (verification), [`keys`] (keypair
//! plumbing), [`frame`] (the duplex wire format) and [`apdu`] (command/
//! response encoding).

pub mod apdu;
pub mod canonical;
pub mod error;
pub mod frame;
pub mod identity;
pub mod keys;
pub mod signature;

pub use error::RelayError;
pub use frame::Frame;
