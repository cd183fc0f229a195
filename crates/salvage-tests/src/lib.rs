//! Cross-crate recovery scenarios for Salvage.
//!
//! Tests live in `tests/`; fixtures for backups, escrow scripts and feeds
//! are in [`helpers`].

pub mod helpers;
