//! OCM runtime - typed payloads and the type scheme.
//!
//! This crate provides:
//! - [`Type`]: the `name[.group][/version]` identifier carried by every typed payload
//! - [`Raw`]: an untyped JSON payload that keeps its type tag
//! - [`Typed`]: the trait implemented by every concrete specification type
//! - [`Scheme`]: the registry mapping identifiers to prototype kinds
//! - Canonical descriptor shapes ([`Resource`], [`Identity`], [`Credentials`], ...)
//!
//! # Example
//!
//! ```rust
//! use ocm_runtime::{Raw, Scheme, Type, Typed};
//! use schemars::JsonSchema;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
//! struct OciImage {
//!     #[serde(rename = "type")]
//!     typ: Type,
//!     #[serde(rename = "imageReference")]
//!     image_reference: String,
//! }
//!
//! impl Typed for OciImage {
//!     fn get_type(&self) -> &Type {
//!         &self.typ
//!     }
//!     fn set_type(&mut self, typ: Type) {
//!         self.typ = typ;
//!     }
//! }
//!
//! # fn main() -> Result<(), ocm_runtime::SchemeError> {
//! let mut scheme = Scheme::new();
//! scheme.register_with_alias::<OciImage>([
//!     Type::versioned("OCIImage", "v1"),
//!     Type::new("OCIImage"),
//! ])?;
//!
//! let raw: Raw = serde_json::from_str(
//!     r#"{"type":"OCIImage","imageReference":"ghcr.io/acme/app:1.0"}"#,
//! )?;
//! let image: OciImage = scheme.decode(&raw)?;
//! assert_eq!(image.image_reference, "ghcr.io/acme/app:1.0");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod descriptor;
pub mod identity;
pub mod scheme;

mod error;
mod raw;
mod typed;
mod types;

pub use descriptor::{
    Digest, ElementMeta, Label, Location, LocationType, Resource, ResourceRelation, SourceRef,
};
pub use error::{RuntimeResult, SchemeError};
pub use identity::{Credentials, Identity};
pub use raw::{Raw, TYPE_FIELD};
pub use scheme::Scheme;
pub use typed::{Prototype, Typed};
pub use types::Type;
