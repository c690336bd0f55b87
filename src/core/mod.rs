// Core modules: record model, metadata, wire codec, dispatch tables and errors.
pub mod codec;
pub mod error;
pub mod metadata;
pub mod model;
pub mod tags;
