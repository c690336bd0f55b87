//! Purpose: Library crate for the data catalog client and its wire codec.
//! Exports: `core` (record model, metadata, codec, errors) and `api` (client surface).
//! Role: Backs the `datacat` CLI; usable directly by other tools.
//! Invariants: The codec is pure; only `api` performs network IO.
pub mod api;
pub mod core;
