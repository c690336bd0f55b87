//! Purpose: Define the public Rust API boundary for the catalog client.
//! Exports: Record model, codec entry points, client and configuration types.
//! Role: Single import path for the CLI and library users.
//! Invariants: Everything a caller needs is re-exported here; `core` paths stay stable too.

mod client;
mod config;

pub use crate::core::codec::{Codec, Decoded, Encode, pack, unpack};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::metadata::{Metadata, Scalar, Truthy};
pub use crate::core::model::{
    CatalogNode, CatalogRecord, Container, ContainerKind, Dataset, DatasetLocation, Entity, Node,
    Record, validate_create_fields,
};
pub use crate::core::tags::{DEFAULT_TYPES, EntityKind, ScalarKind, TAG_DISPATCH, TypeTable};
pub use client::{CatalogClient, SearchOptions, View};
pub use config::{
    ClientConfig, DEFAULT_EXPERIMENT, ENV_EXPERIMENT, ENV_MODE, ENV_TIMEOUT_MS, ENV_URL, Mode,
    base_url,
};
