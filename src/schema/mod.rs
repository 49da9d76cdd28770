//! Schema-driven [`Executor`].
//!
//! A [`Schema`] is a set of object types, an optional query root and the
//! root fields of the subscription type. Field resolvers may answer
//! immediately or hand back a future; execution awaits every one of them
//! before a result is produced, so a result never contains a field whose
//! resolver is still running.
//!
//! ```text
//! start{query}
//!   │
//!   ├── subscribe: parse → validate → root field resolver → EventSource
//!   │
//!   └── execute (per source value):
//!         complete_value(root type, value)
//!           └── execute_fields (siblings resolved concurrently)
//!                 └── resolve_field → Resolution::resolve().await
//!                       └── complete_value (recursively)
//! ```

pub mod query;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::{Map, Value};

pub use query::{Document, Field, OperationDefinition, OperationKind};
pub use types::{FieldDef, ObjectType, ResolveContext, SubscriptionField, TypeRef};

use crate::error::GatewayError;
use crate::executor::{
    EventSource, ExecutionResult, Executor, GraphQLError, OperationRequest, PathSegment, Producer,
};

/// Meta field available on every object type.
const TYPENAME: &str = "__typename";

/// Name reported for the subscription root type.
pub const SUBSCRIPTION_TYPE: &str = "Subscription";

/// Validates `connection_init` payloads.
pub type ConnectHook = Arc<dyn Fn(Option<&Value>) -> Result<(), String> + Send + Sync>;

/// Executable schema.
pub struct Schema {
    query_type: Option<String>,
    types: HashMap<String, ObjectType>,
    subscriptions: HashMap<String, SubscriptionField>,
    connect_hook: Option<ConnectHook>,
}

/// Builder for [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    query_type: Option<String>,
    types: HashMap<String, ObjectType>,
    subscriptions: HashMap<String, SubscriptionField>,
    connect_hook: Option<ConnectHook>,
}

impl SchemaBuilder {
    /// Registers `object` and makes it the query root.
    #[must_use]
    pub fn query(mut self, object: ObjectType) -> Self {
        self.query_type = Some(object.name().to_string());
        self.object(object)
    }

    /// Registers an object type.
    #[must_use]
    pub fn object(mut self, object: ObjectType) -> Self {
        self.types.insert(object.name().to_string(), object);
        self
    }

    /// Adds a root field to the subscription type.
    #[must_use]
    pub fn subscription(mut self, name: impl Into<String>, field: SubscriptionField) -> Self {
        self.subscriptions.insert(name.into(), field);
        self
    }

    /// Installs a `connection_init` validation hook.
    #[must_use]
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.connect_hook = Some(Arc::new(hook));
        self
    }

    /// Finishes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Schema`] if a field refers to an object type
    /// that was never registered.
    pub fn build(self) -> Result<Schema, GatewayError> {
        let object_refs = self.types.values().flat_map(|object| {
            object
                .fields()
                .map(move |(field, def)| (object.name(), field, def.ty()))
        });
        let subscription_refs = self
            .subscriptions
            .iter()
            .map(|(field, def)| (SUBSCRIPTION_TYPE, field.as_str(), def.ty()));

        for (owner, field, ty) in object_refs.chain(subscription_refs) {
            if let Some(name) = ty.object_name()
                && !self.types.contains_key(name)
            {
                return Err(GatewayError::Schema(format!(
                    "field `{owner}.{field}` refers to unknown type `{name}`"
                )));
            }
        }

        Ok(Schema {
            query_type: self.query_type,
            types: self.types,
            subscriptions: self.subscriptions,
            connect_hook: self.connect_hook,
        })
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("query_type", &self.query_type)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("query_type", &self.query_type)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.keys().collect::<Vec<_>>())
            .field("connect_hook", &self.connect_hook.is_some())
            .finish()
    }
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    fn object_type(&self, name: &str) -> Result<&ObjectType, GraphQLError> {
        self.types
            .get(name)
            .ok_or_else(|| GraphQLError::new(format!("Unknown type \"{name}\".")))
    }

    fn query_root(&self) -> Result<&ObjectType, GraphQLError> {
        let name = self
            .query_type
            .as_deref()
            .ok_or_else(|| GraphQLError::new("Schema is not configured for queries."))?;
        self.object_type(name)
    }

    fn subscription_root<'d>(
        &self,
        operation: &'d OperationDefinition,
    ) -> Result<(&'d Field, &SubscriptionField), GraphQLError> {
        let [field] = operation.selection_set.as_slice() else {
            return Err(GraphQLError::new(match &operation.name {
                Some(name) => format!("Subscription \"{name}\" must select only one top level field."),
                None => "Anonymous Subscription must select only one top level field.".to_string(),
            }));
        };
        let def = self.subscriptions.get(&field.name).ok_or_else(|| {
            GraphQLError::new(format!(
                "Cannot query field \"{}\" on type \"{SUBSCRIPTION_TYPE}\".",
                field.name
            ))
        })?;
        Ok((field, def))
    }

    fn validate_selection(&self, object: &ObjectType, selection: &[Field]) -> Result<(), GraphQLError> {
        for field in selection {
            if field.name == TYPENAME {
                if !field.selection_set.is_empty() {
                    return Err(GraphQLError::new(format!(
                        "Field \"{TYPENAME}\" must not have a selection since type \"String\" has no subfields."
                    )));
                }
                continue;
            }
            let def = object.get(&field.name).ok_or_else(|| {
                GraphQLError::new(format!(
                    "Cannot query field \"{}\" on type \"{}\".",
                    field.name,
                    object.name()
                ))
            })?;
            self.validate_field(def.ty(), field)?;
        }
        Ok(())
    }

    fn validate_field(&self, ty: &TypeRef, field: &Field) -> Result<(), GraphQLError> {
        match ty.object_name() {
            None if field.selection_set.is_empty() => Ok(()),
            None => Err(GraphQLError::new(format!(
                "Field \"{}\" must not have a selection since its type is a scalar.",
                field.name
            ))),
            Some(name) if field.selection_set.is_empty() => Err(GraphQLError::new(format!(
                "Field \"{}\" of type \"{name}\" must have a selection of subfields.",
                field.name
            ))),
            Some(name) => self.validate_selection(self.object_type(name)?, &field.selection_set),
        }
    }

    fn create_source(&self, request: &OperationRequest) -> Result<EventSource, GraphQLError> {
        let document = query::parse(&request.query)?;
        let operation = document.operation(request.operation_name.as_deref())?;
        match operation.kind {
            OperationKind::Query => {
                self.validate_selection(self.query_root()?, &operation.selection_set)?;
                Ok(Producer::immediate(Value::Object(Map::new())))
            }
            OperationKind::Subscription => {
                let (field, def) = self.subscription_root(operation)?;
                self.validate_field(def.ty(), field)?;
                let variables = operation.coerce_variables(&request.variables);
                let ctx = ResolveContext {
                    parent: Value::Null,
                    arguments: field.argument_values(&variables),
                };
                let key = field.response_key().to_string();
                Ok(def.source(ctx).map_err(move |error| {
                    GraphQLError::new(error.message).with_path(vec![PathSegment::Key(key.clone())])
                }))
            }
        }
    }

    async fn execute_operation(
        &self,
        request: &OperationRequest,
        root: Value,
    ) -> Result<Value, GraphQLError> {
        let document = query::parse(&request.query)?;
        let operation = document.operation(request.operation_name.as_deref())?;
        let variables = operation.coerce_variables(&request.variables);
        match operation.kind {
            OperationKind::Query => {
                let data = self
                    .execute_fields(
                        self.query_root()?,
                        &root,
                        &operation.selection_set,
                        &variables,
                        Vec::new(),
                    )
                    .await?;
                Ok(Value::Object(data))
            }
            OperationKind::Subscription => {
                let (field, def) = self.subscription_root(operation)?;
                let key = field.response_key().to_string();
                let value = self
                    .complete_value(
                        def.ty(),
                        root,
                        &field.selection_set,
                        &variables,
                        vec![PathSegment::Key(key.clone())],
                    )
                    .await?;
                let mut data = Map::new();
                data.insert(key, value);
                Ok(Value::Object(data))
            }
        }
    }

    /// Resolves every selected field of `object`; siblings run concurrently.
    fn execute_fields<'a>(
        &'a self,
        object: &'a ObjectType,
        parent: &'a Value,
        selection: &'a [Field],
        variables: &'a Map<String, Value>,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'a, Result<Map<String, Value>, GraphQLError>> {
        async move {
            let resolved = future::try_join_all(selection.iter().map(|field| {
                let mut field_path = path.clone();
                field_path.push(PathSegment::Key(field.response_key().to_string()));
                async move {
                    let value = self
                        .resolve_field(object, parent, field, variables, field_path)
                        .await?;
                    Ok::<_, GraphQLError>((field.response_key().to_string(), value))
                }
            }))
            .await?;
            Ok(resolved.into_iter().collect())
        }
        .boxed()
    }

    async fn resolve_field(
        &self,
        object: &ObjectType,
        parent: &Value,
        field: &Field,
        variables: &Map<String, Value>,
        path: Vec<PathSegment>,
    ) -> Result<Value, GraphQLError> {
        if field.name == TYPENAME {
            return Ok(Value::String(object.name().to_string()));
        }
        let def = object.get(&field.name).ok_or_else(|| {
            GraphQLError::new(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field.name,
                object.name()
            ))
            .with_path(path.clone())
        })?;

        let value = match def.resolver() {
            Some(resolver) => {
                let ctx = ResolveContext {
                    parent: parent.clone(),
                    arguments: field.argument_values(variables),
                };
                resolver(ctx)
                    .resolve()
                    .await
                    .map_err(|error| GraphQLError::new(error.message).with_path(path.clone()))?
            }
            None => parent.get(&field.name).cloned().unwrap_or(Value::Null),
        };

        self.complete_value(def.ty(), value, &field.selection_set, variables, path)
            .await
    }

    fn complete_value<'a>(
        &'a self,
        ty: &'a TypeRef,
        value: Value,
        selection: &'a [Field],
        variables: &'a Map<String, Value>,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'a, Result<Value, GraphQLError>> {
        async move {
            if value.is_null() {
                return Ok(Value::Null);
            }
            match ty {
                TypeRef::Scalar => Ok(value),
                TypeRef::Object(name) => {
                    let object = self
                        .object_type(name)
                        .map_err(|e| e.with_path(path.clone()))?;
                    let fields = self
                        .execute_fields(object, &value, selection, variables, path)
                        .await?;
                    Ok(Value::Object(fields))
                }
                TypeRef::List(inner) => {
                    let Value::Array(items) = value else {
                        return Err(GraphQLError::new("Expected a list value.").with_path(path));
                    };
                    let completed =
                        future::try_join_all(items.into_iter().enumerate().map(|(index, item)| {
                            let mut item_path = path.clone();
                            item_path.push(PathSegment::Index(index));
                            self.complete_value(inner, item, selection, variables, item_path)
                        }))
                        .await?;
                    Ok(Value::Array(completed))
                }
            }
        }
        .boxed()
    }
}

impl Executor for Schema {
    fn connect(&self, payload: Option<&Value>) -> Result<(), String> {
        match &self.connect_hook {
            Some(hook) => hook(payload),
            None => Ok(()),
        }
    }

    fn subscribe<'a>(
        &'a self,
        request: &'a OperationRequest,
    ) -> BoxFuture<'a, Result<EventSource, Vec<GraphQLError>>> {
        async move { self.create_source(request).map_err(|error| vec![error]) }.boxed()
    }

    fn execute<'a>(
        &'a self,
        request: &'a OperationRequest,
        root: Value,
    ) -> BoxFuture<'a, ExecutionResult> {
        async move {
            match self.execute_operation(request, root).await {
                Ok(data) => ExecutionResult::from_data(data),
                Err(error) => ExecutionResult::from_errors(vec![error]),
            }
        }
        .boxed()
    }
}
