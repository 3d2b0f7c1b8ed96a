//! The type scheme.
//!
//! A [`Scheme`] maps type identifiers to prototype kinds. A kind is a
//! concrete Rust type implementing [`Prototype`]; it can be bound to any
//! number of identifiers (a versioned name plus unversioned aliases, for
//! example). The first identifier bound to a kind is its canonical type.
//!
//! Schemes are built once during startup and then shared read-only,
//! usually behind an `Arc`.

use std::any::{TypeId, type_name};
use std::collections::HashMap;

use schemars::r#gen::SchemaGenerator;
use schemars::schema::RootSchema;
use serde_json::Value;
use tracing::debug;

use crate::error::{RuntimeResult, SchemeError};
use crate::raw::Raw;
use crate::typed::{Prototype, Typed};
use crate::types::Type;

/// A registered prototype kind.
#[derive(Debug, Clone)]
struct Kind {
    type_name: &'static str,
    /// Bound identifiers, canonical first.
    types: Vec<Type>,
    schema: fn() -> RootSchema,
}

fn schema_of<T: Prototype>() -> RootSchema {
    SchemaGenerator::default().into_root_schema_for::<T>()
}

/// Registry of type identifiers and the prototype kinds they decode into.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: HashMap<TypeId, Kind>,
    types: HashMap<Type, TypeId>,
    allow_unknown: bool,
}

impl Scheme {
    /// Create an empty scheme that rejects unknown types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scheme that lets payloads with unknown type tags be
    /// converted into [`Raw`] destinations.
    #[must_use]
    pub fn with_unknown_allowed() -> Self {
        Self {
            allow_unknown: true,
            ..Self::default()
        }
    }

    /// Whether unknown types are passed through into [`Raw`] destinations.
    #[must_use]
    pub fn allows_unknown(&self) -> bool {
        self.allow_unknown
    }

    /// Bind every identifier in `types` to the kind `T`.
    ///
    /// Re-binding an identifier to the kind it already belongs to is a
    /// no-op, so alias registration is idempotent. Nothing is inserted
    /// unless every identifier can be bound.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::AlreadyRegistered`] if any identifier is bound
    /// to a different kind and [`SchemeError::InvalidType`] for empty
    /// identifiers.
    pub fn register_with_alias<T: Prototype>(
        &mut self,
        types: impl IntoIterator<Item = Type>,
    ) -> RuntimeResult<()> {
        let id = TypeId::of::<T>();
        let requested = type_name::<T>();
        let types: Vec<Type> = types.into_iter().collect();
        if types.is_empty() {
            return Ok(());
        }

        for typ in &types {
            if typ.is_empty() {
                return Err(SchemeError::InvalidType {
                    input: String::new(),
                    reason: format!("cannot register an empty type for {requested}"),
                });
            }
            self.check_binding(typ, id, requested)?;
        }

        let kind = self.kinds.entry(id).or_insert_with(|| Kind {
            type_name: requested,
            types: Vec::new(),
            schema: schema_of::<T>,
        });
        for typ in types {
            if !kind.types.contains(&typ) {
                debug!(typ = %typ, kind = requested, "Registered type");
                kind.types.push(typ.clone());
            }
            self.types.insert(typ, id);
        }
        Ok(())
    }

    /// Bind a single identifier to the kind `T`.
    ///
    /// # Errors
    ///
    /// See [`Scheme::register_with_alias`].
    pub fn register<T: Prototype>(&mut self, typ: Type) -> RuntimeResult<()> {
        self.register_with_alias::<T>([typ])
    }

    /// Merge every binding of `other` into this scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::AlreadyRegistered`] if `other` binds an
    /// identifier to a kind different from this scheme's binding. Nothing is
    /// merged in that case.
    pub fn register_scheme(&mut self, other: &Scheme) -> RuntimeResult<()> {
        for (typ, id) in &other.types {
            let requested = other.kinds.get(id).map_or("<unknown>", |k| k.type_name);
            self.check_binding(typ, *id, requested)?;
        }

        for (id, theirs) in &other.kinds {
            let ours = self.kinds.entry(*id).or_insert_with(|| Kind {
                type_name: theirs.type_name,
                types: Vec::new(),
                schema: theirs.schema,
            });
            for typ in &theirs.types {
                if !ours.types.contains(typ) {
                    ours.types.push(typ.clone());
                }
                self.types.insert(typ.clone(), *id);
            }
        }
        Ok(())
    }

    fn check_binding(&self, typ: &Type, id: TypeId, requested: &'static str) -> RuntimeResult<()> {
        match self.types.get(typ) {
            Some(existing) if *existing != id => Err(SchemeError::AlreadyRegistered {
                typ: typ.clone(),
                existing: self.kind_name_of(*existing),
                requested,
            }),
            _ => Ok(()),
        }
    }

    fn kind_name_of(&self, id: TypeId) -> &'static str {
        self.kinds.get(&id).map_or("<unknown>", |k| k.type_name)
    }

    fn kind<T: 'static>(&self) -> RuntimeResult<&Kind> {
        self.kinds
            .get(&TypeId::of::<T>())
            .ok_or(SchemeError::NotRegistered {
                kind: type_name::<T>(),
            })
    }

    /// Whether the identifier is bound to any kind.
    #[must_use]
    pub fn is_registered(&self, typ: &Type) -> bool {
        self.types.contains_key(typ)
    }

    /// All bound identifiers, in no particular order.
    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.keys()
    }

    /// The canonical identifier of the kind `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] if `T` has no identifier.
    pub fn type_for<T: 'static>(&self) -> RuntimeResult<&Type> {
        self.kind::<T>()?
            .types
            .first()
            .ok_or(SchemeError::NotRegistered {
                kind: type_name::<T>(),
            })
    }

    /// The canonical identifier of a value's kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] if the kind has no identifier.
    pub fn type_for_prototype<T: Typed>(&self, _value: &T) -> RuntimeResult<&Type> {
        self.type_for::<T>()
    }

    /// Every identifier bound to the kind `T`, canonical first.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] if `T` has no identifier.
    pub fn types_for<T: 'static>(&self) -> RuntimeResult<&[Type]> {
        Ok(&self.kind::<T>()?.types)
    }

    /// Every identifier bound to the same kind as `typ`, canonical first.
    ///
    /// Unknown identifiers resolve to themselves alone.
    #[must_use]
    pub fn aliases(&self, typ: &Type) -> Vec<Type> {
        self.types
            .get(typ)
            .and_then(|id| self.kinds.get(id))
            .map_or_else(|| vec![typ.clone()], |kind| kind.types.clone())
    }

    /// Fill in an empty type tag with the canonical identifier of the
    /// value's kind. Returns whether the value was changed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] if the tag is empty and the
    /// kind has no identifier.
    pub fn default_type<T: Typed>(&self, value: &mut T) -> RuntimeResult<bool> {
        if !value.get_type().is_empty() {
            return Ok(false);
        }
        let typ = self.type_for::<T>()?.clone();
        value.set_type(typ);
        Ok(true)
    }

    /// The type a value resolves to: its own tag, or the canonical
    /// identifier of its kind if the tag is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotRegistered`] if the tag is empty and the
    /// kind has no identifier.
    pub fn resolve_type<T: Typed>(&self, value: &T) -> RuntimeResult<Type> {
        let typ = value.get_type();
        if typ.is_empty() {
            return self.type_for::<T>().cloned();
        }
        Ok(typ.clone())
    }

    /// Decode `raw` into `dest` using its type tag.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemeError::MissingType`] for untagged payloads,
    /// [`SchemeError::UnknownType`] if the tag is not bound, and
    /// [`SchemeError::KindMismatch`] if the tag belongs to another kind.
    pub fn convert<T: Prototype>(&self, raw: &Raw, dest: &mut T) -> RuntimeResult<()> {
        *dest = self.decode(raw)?;
        Ok(())
    }

    /// Decode `raw` into a new value of kind `T`.
    ///
    /// A [`Raw`] destination accepts any known tag, and unknown tags too if
    /// the scheme allows them.
    ///
    /// # Errors
    ///
    /// See [`Scheme::convert`].
    pub fn decode<T: Prototype>(&self, raw: &Raw) -> RuntimeResult<T> {
        let typ = raw.get_type();
        if typ.is_empty() {
            return Err(SchemeError::MissingType);
        }

        let wanted = TypeId::of::<T>();
        match self.types.get(typ) {
            None if !(self.allow_unknown && wanted == TypeId::of::<Raw>()) => {
                return Err(SchemeError::UnknownType(typ.clone()));
            },
            Some(registered) if *registered != wanted && wanted != TypeId::of::<Raw>() => {
                return Err(SchemeError::KindMismatch {
                    typ: typ.clone(),
                    registered: self.kind_name_of(*registered),
                    requested: type_name::<T>(),
                });
            },
            _ => {},
        }

        let mut value: T = serde_json::from_value(raw.to_value())?;
        if value.get_type().is_empty() {
            value.set_type(typ.clone());
        }
        Ok(value)
    }

    /// Encode a typed value into a [`Raw`] payload, defaulting its type.
    ///
    /// # Errors
    ///
    /// Fails if the value has no type and its kind is not registered, or if
    /// it does not serialize to a JSON object.
    pub fn encode<T: Prototype>(&self, value: &T) -> RuntimeResult<Raw> {
        let mut raw = Raw::from_serializable(value)?;
        if raw.get_type().is_empty() {
            raw.set_type(self.resolve_type(value)?);
        }
        Ok(raw)
    }

    /// The JSON Schema of the kind bound to `typ`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::UnknownType`] if the identifier is not bound.
    pub fn json_schema(&self, typ: &Type) -> RuntimeResult<Value> {
        let kind = self
            .types
            .get(typ)
            .and_then(|id| self.kinds.get(id))
            .ok_or_else(|| SchemeError::UnknownType(typ.clone()))?;
        Ok(serde_json::to_value((kind.schema)())?)
    }
}
