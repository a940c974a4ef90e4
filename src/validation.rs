//! Envelope validation against named JSON schemas.
//!
//! A payload is wrapped as `{context, payload, tool_calls}` and checked
//! against `<name>.json` from a [`SchemaStore`]. Relative `$ref`s such as
//! `common.json#/definitions/context` are loaded from the same store.
//! Anything that prevents a positive answer (missing schema, broken schema,
//! violation) is reported as [`SchemaViolation`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema, SchemaResolver, SchemaResolverError};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::contracts::Contract;
use crate::error::{AsgaError, Result, SchemaViolation};

const BUILTIN_SCHEMAS: &[(&str, &str)] = &[
    ("common", include_str!("../schemas/mcp/common.json")),
    ("spec", include_str!("../schemas/mcp/spec.json")),
    ("critique", include_str!("../schemas/mcp/critique.json")),
];

/// Names usable as file stems: ASCII alphanumerics, `-` and `_`.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Source of named schema documents.
pub trait SchemaStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Value>;
}

/// Reads `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirSchemaStore {
    dir: PathBuf,
}

impl DirSchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SchemaStore for DirSchemaStore {
    fn load(&self, name: &str) -> Result<Value> {
        if !is_plain_name(name) {
            return Err(AsgaError::Config(format!("invalid schema name `{name}`")));
        }
        let contents = std::fs::read_to_string(self.dir.join(format!("{name}.json")))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySchemaStore {
    schemas: HashMap<String, Value>,
}

impl MemorySchemaStore {
    /// Store preloaded with the schemas shipped in `schemas/mcp`.
    pub fn builtin() -> Result<Self> {
        let mut store = Self::default();
        for (name, text) in BUILTIN_SCHEMAS {
            store.insert(*name, serde_json::from_str(text)?);
        }
        Ok(store)
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: Value) {
        self.schemas.insert(name.into(), schema);
    }
}

impl SchemaStore for MemorySchemaStore {
    fn load(&self, name: &str) -> Result<Value> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| AsgaError::Config(format!("unknown schema `{name}`")))
    }
}

/// Resolves external references by file stem through the owning store.
struct StoreResolver {
    store: Arc<dyn SchemaStore>,
}

impl SchemaResolver for StoreResolver {
    fn resolve(
        &self,
        _root_schema: &Value,
        url: &Url,
        original_reference: &str,
    ) -> std::result::Result<Arc<Value>, SchemaResolverError> {
        let file = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        let name = file.strip_suffix(".json").unwrap_or(file);
        if !is_plain_name(name) {
            return Err(anyhow::anyhow!("unresolvable reference `{original_reference}`"));
        }
        let schema = self.store.load(name)?;
        Ok(Arc::new(schema))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub context: Map<String, Value>,
    pub payload: &'a Value,
    pub tool_calls: Vec<Value>,
}

impl<'a> Envelope<'a> {
    pub fn wrap(payload: &'a Value) -> Self {
        Self {
            context: Map::new(),
            payload,
            tool_calls: Vec::new(),
        }
    }
}

/// Fail-closed gate for payloads leaving the process.
#[derive(Clone)]
pub struct EnvelopeValidator {
    store: Arc<dyn SchemaStore>,
}

impl EnvelopeValidator {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }

    /// Validator backed by the built-in schemas.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(Arc::new(MemorySchemaStore::builtin()?)))
    }

    /// Validate a contract record against the schema of the same name.
    pub fn validate_contract<C: Contract>(&self, record: &C) -> Result<()> {
        self.validate(&record.payload()?, C::NAME)
    }

    pub fn validate(&self, payload: &Value, schema_name: &str) -> Result<()> {
        let fail = |errors: Vec<String>| -> AsgaError {
            SchemaViolation {
                schema: schema_name.to_string(),
                errors,
            }
            .into()
        };

        let schema = self
            .store
            .load(schema_name)
            .map_err(|e| fail(vec![format!("schema unavailable: {e}")]))?;
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .with_resolver(StoreResolver {
                store: Arc::clone(&self.store),
            })
            .compile(&schema)
            .map_err(|e| fail(vec![format!("invalid schema: {e}")]))?;

        let instance = serde_json::to_value(Envelope::wrap(payload))?;
        let result = match compiled.validate(&instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect::<Vec<_>>()),
        };
        result.map_err(|errors| {
            tracing::debug!(schema = schema_name, ?errors, "envelope rejected");
            fail(errors)
        })
    }
}
