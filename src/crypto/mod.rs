//! Cipher-suite capability set (spec §4.3) and the HKDF helpers built on
//! top of it (spec §4.3, §6.6 of the referenced MLS draft).

pub mod ciphersuite;
pub mod dh;
pub mod ecies;
pub mod hkdf;
pub mod rng;
pub mod sig;
