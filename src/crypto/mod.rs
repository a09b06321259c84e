//! Seed phrases, key derivation and address validation.

pub mod address;
pub mod derivation;
pub mod mnemonic;

pub use address::AddressValidator;
pub use derivation::KeyDerivationEngine;
pub use mnemonic::{Seed, SeedManager, WordCount};
