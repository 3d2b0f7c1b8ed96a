//! The `Typed` trait.

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::Type;

/// A value that carries a type identifier.
///
/// Every typed specification (access specs, repository specs, ...) and
/// [`Raw`](crate::Raw) implements this. An empty type means "not yet
/// defaulted"; [`Scheme::default_type`](crate::Scheme::default_type) fills
/// it in from the registered prototype kind.
pub trait Typed: Send + Sync + 'static {
    /// The current type tag (possibly empty).
    fn get_type(&self) -> &Type;

    /// Replace the type tag.
    fn set_type(&mut self, typ: Type);
}

/// A typed value that can be registered as a prototype in a
/// [`Scheme`](crate::Scheme): it decodes from and encodes to JSON and can
/// describe itself as a JSON Schema.
pub trait Prototype: Typed + Serialize + DeserializeOwned + JsonSchema {}

impl<T> Prototype for T where T: Typed + Serialize + DeserializeOwned + JsonSchema {}
