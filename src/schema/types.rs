//! Object types, fields and resolvers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::executor::{FieldError, Producer, Resolution};

/// Declared return type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Leaf value returned as-is.
    Scalar,
    /// Object type resolved against a sub-selection.
    Object(String),
    /// List of the inner type.
    List(Box<TypeRef>),
}

impl TypeRef {
    /// Reference to the named object type.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// List of `inner`.
    #[must_use]
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    /// Name of the object type at the bottom of any list wrapping.
    #[must_use]
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::Scalar => None,
            Self::Object(name) => Some(name),
            Self::List(inner) => inner.object_name(),
        }
    }
}

/// Input handed to a resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Value of the enclosing object; `null` for root fields.
    pub parent: Value,
    /// Argument values with variables substituted.
    pub arguments: Map<String, Value>,
}

impl ResolveContext {
    /// Returns the named argument.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }
}

/// Resolver of an ordinary field.
pub type FieldResolver = Arc<dyn Fn(ResolveContext) -> Resolution + Send + Sync>;

/// Resolver of a subscription root field.
pub type SourceResolver = Arc<dyn Fn(ResolveContext) -> Producer<Value, FieldError> + Send + Sync>;

/// A field of an object type.
#[derive(Clone)]
pub struct FieldDef {
    ty: TypeRef,
    resolver: Option<FieldResolver>,
}

impl FieldDef {
    /// A field of type `ty` that reads the same-named key of its parent.
    #[must_use]
    pub fn new(ty: TypeRef) -> Self {
        Self { ty, resolver: None }
    }

    /// A scalar field.
    #[must_use]
    pub fn scalar() -> Self {
        Self::new(TypeRef::Scalar)
    }

    /// A field returning the named object type.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::new(TypeRef::object(name))
    }

    /// Resolves the field with `resolver` instead of a parent lookup.
    #[must_use]
    pub fn resolve_with<F>(mut self, resolver: F) -> Self
    where
        F: Fn(ResolveContext) -> Resolution + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Declared return type.
    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Custom resolver, if any.
    #[must_use]
    pub fn resolver(&self) -> Option<&FieldResolver> {
        self.resolver.as_ref()
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("ty", &self.ty)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// A named object type.
#[derive(Debug, Clone)]
pub struct ObjectType {
    name: String,
    fields: HashMap<String, FieldDef>,
}

impl ObjectType {
    /// An object type without fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: FieldDef) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Iterates over the declared fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(name, def)| (name.as_str(), def))
    }
}

/// A root field of the subscription type.
#[derive(Clone)]
pub struct SubscriptionField {
    ty: TypeRef,
    resolver: SourceResolver,
}

impl SubscriptionField {
    /// A subscription field whose events are of type `ty`.
    #[must_use]
    pub fn new<F>(ty: TypeRef, resolver: F) -> Self
    where
        F: Fn(ResolveContext) -> Producer<Value, FieldError> + Send + Sync + 'static,
    {
        Self {
            ty,
            resolver: Arc::new(resolver),
        }
    }

    /// Declared event type.
    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Creates the event source for one operation.
    #[must_use]
    pub fn source(&self, ctx: ResolveContext) -> Producer<Value, FieldError> {
        (self.resolver)(ctx)
    }
}

impl fmt::Debug for SubscriptionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionField")
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_name_unwraps_lists() {
        let ty = TypeRef::list(TypeRef::list(TypeRef::object("Tick")));
        assert_eq!(ty.object_name(), Some("Tick"));
        assert_eq!(TypeRef::Scalar.object_name(), None);
    }

    #[test]
    fn null_arguments_read_as_missing() {
        let mut arguments = Map::new();
        arguments.insert("from".to_string(), Value::Null);
        arguments.insert("topic".to_string(), json!("news"));
        let ctx = ResolveContext {
            parent: Value::Null,
            arguments,
        };
        assert!(ctx.arg("from").is_none());
        assert_eq!(ctx.arg("topic"), Some(&json!("news")));
    }

    #[test]
    fn fields_are_registered_by_name() {
        let object = ObjectType::new("SyncData")
            .field("field", FieldDef::scalar().resolve_with(|_| Resolution::value(true)));
        assert_eq!(object.name(), "SyncData");
        let Some(field) = object.get("field") else {
            panic!("field was registered");
        };
        assert!(field.resolver().is_some());
        assert!(object.get("other").is_none());
    }
}
