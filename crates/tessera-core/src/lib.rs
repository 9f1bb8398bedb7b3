//! tessera-core
//!
//! Multi-chain task execution for NFT platforms.
//!
//! # Modules
//! - **domain**: tasks, payloads, wallets, lanes, chain errors
//! - **custody**: Shamir key splitting over GF(256)
//! - **ports**: storage, chain adapter, alert and clock abstractions
//! - **impls**: in-memory and local-filesystem implementations
//! - **app**: engine, dispatcher, submitter, reconciler and the builder

pub mod app;
pub mod custody;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{EngineBuilder, EngineConfig, Tessera};
