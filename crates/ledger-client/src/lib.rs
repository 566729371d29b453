//! Conflux Ledger Client Library
//!
//! This crate is the host side of the APDU protocol spoken by the Conflux
//! signing application on Ledger hardware wallets and their emulator.
//!
//! # Overview
//!
//! The device keeps the private keys. The host asks it for version
//! information and public keys, and hands it opaque transactions and
//! personal messages to sign. Signing requires the user to approve on the
//! device, so a signing request is sent first and its answer collected once
//! the buttons have been pressed.
//!
//! This library provides:
//!
//! - **Framing**: command frames, with large payloads split into chunks
//! - **Exchange**: synchronous and confirmation-pending request/response
//!   sequencing over a pluggable transport
//! - **Decoding**: offset-exact parsing of every response layout
//! - **Errors**: status words mapped to typed errors, with user rejection
//!   distinguished from other failures
//! - **Verification**: host-side secp256k1 checks of returned signatures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ConfluxApp                            │
//! │     get_version · get_public_key · sign_tx · personal_sign   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────────┐  ┌──────────┐  ┌─────────┐  │
//! │  │ command  │  │   channel    │  │ response │  │  apdu   │  │
//! │  │ (frames) │  │ (exchanges)  │  │ (decode) │  │ (status)│  │
//! │  └──────────┘  └──────────────┘  └──────────┘  └─────────┘  │
//! ├─────────────────────────────────────────────────────────────┤
//! │   Transport (TCP emulator / custom)  │  Button (confirm UI)  │
//! └─────────────────────────────────────────────────────────────┘
//!            crypto: verify signatures against public keys
//! ```
//!
//! # Quick Start
//!
//! ## Building Frames
//!
//! ```rust
//! use cfx_ledger_client::Bip32Path;
//! use cfx_ledger_client::ledger::command;
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse().unwrap();
//! let frames = command::sign_tx(&path, &[0u8; 600]).unwrap();
//!
//! // 21 path bytes + 600 transaction bytes, 255 bytes per frame.
//! assert_eq!(frames.len(), 3);
//! assert_eq!(frames[0].p2(), command::P2_MORE);
//! assert_eq!(frames[2].p2(), command::P2_LAST);
//! ```
//!
//! ## Verifying a Signature
//!
//! ```rust
//! use cfx_ledger_client::SignatureResult;
//! use cfx_ledger_client::crypto::verify_personal_message_signature;
//!
//! let public_key = [0x04; 65];
//! let signature = SignatureResult::new(0, [1u8; 32], [1u8; 32]);
//!
//! // Not a valid curve point: verification fails, it does not error.
//! assert!(!verify_personal_message_signature(&public_key, &signature, b"hi"));
//! ```
//!
//! ## Talking to the Emulator
//!
//! ```no_run
//! use cfx_ledger_client::Bip32Path;
//! use cfx_ledger_client::config::EmulatorConfig;
//! use cfx_ledger_client::ledger::{Button, ConfluxApp, TcpButton, TcpTransport};
//!
//! let config = EmulatorConfig::from_env()?;
//! let mut app = ConfluxApp::new(Box::new(TcpTransport::from_config(&config)?));
//! let mut button = TcpButton::connect(&config)?;
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse()?;
//! let key = app.get_public_key(&path, false)?;
//!
//! let pending = app.begin_sign_tx(&path, &[0xEB; 40])?;
//! button.right_click()?;
//! button.both_click()?;
//! let signature = app.finish_signing(pending)?;
//!
//! assert!(cfx_ledger_client::crypto::verify_transaction_signature(
//!     &key.public_key,
//!     &signature,
//!     &[0xEB; 40],
//! ));
//! # Ok::<(), cfx_ledger_client::Error>(())
//! ```
//!
//! # Logging
//!
//! Every layer emits [`tracing`] events: frames at `trace`, exchange
//! outcomes at `debug`, and confirmation waits at `info`. The library never
//! installs a subscriber.

// Modules
pub mod bip32;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod signature;

// Re-exports for convenience
pub use bip32::Bip32Path;
pub use error::{Error, Result};
pub use signature::SignatureResult;

// Re-export commonly used alloy types
pub use alloy_primitives::B256;

#[cfg(test)]
use tracing_subscriber as _;
