//! # Sift Core
//!
//! Shared, I/O-free logic for Sift: content models, the eligibility
//! filter, per-run id allocation, the embedding trait, and the vector
//! index capability traits with an in-memory implementation.
//!
//! This crate contains no tokio, sqlx, network, or filesystem code.
//! Source adapters, extraction, and the persistent index live in the
//! `sift` app crate.

pub mod embedding;
pub mod filter;
pub mod ids;
pub mod index;
pub mod models;
