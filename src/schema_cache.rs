//! # Schema Validator Cache
//!
//! Compiles JSON Schema documents into reusable validators and caches them
//! by schema reference. Compilation is expensive (the schema plus all of its
//! referenced documents are read from disk, resolved, and compiled), so the
//! cache ensures each distinct reference is only compiled once per process,
//! then served as a cheap `Arc` clone on every subsequent lookup.
//!
//! ## Caching strategy
//!
//! - **Key**: the main schema path plus its reference paths, joined in
//!   order. Two references listing the same files in a different order are
//!   distinct keys.
//! - **Value**: `Arc<jsonschema::Validator>` shared across requests.
//! - **Failures are never cached**: a missing or malformed schema file
//!   errors on every lookup until it is fixed on disk.
//!
//! ## Concurrency
//!
//! Lookups take the lock twice (check, then insert after compiling outside
//! the lock). Two requests racing on a cold key may both compile; the loser
//! of the second lock simply reuses the winner's validator.

use jsonschema::{Retrieve, Uri, Validator};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// A request-body schema: a main document plus any documents it references
/// by `$ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef {
    /// Path to the main schema document.
    pub main: PathBuf,
    /// Paths to documents the main schema references, keyed by file name in
    /// the retriever. Order is significant for cache identity.
    pub references: Vec<PathBuf>,
}

impl SchemaRef {
    pub fn new(main: impl Into<PathBuf>) -> Self {
        Self {
            main: main.into(),
            references: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_references(mut self, references: Vec<PathBuf>) -> Self {
        self.references = references;
        self
    }

    /// Cache key: main path plus reference paths joined in order.
    pub(crate) fn cache_key(&self) -> String {
        let mut key = self.main.to_string_lossy().into_owned();
        for r in &self.references {
            key.push('|');
            key.push_str(&r.to_string_lossy());
        }
        key
    }
}

/// Resolves `$ref` URIs against the preloaded reference documents. Any URI
/// not preloaded is an error; body validation must never reach the network.
struct PreloadedRetriever {
    documents: HashMap<String, Value>,
}

impl Retrieve for PreloadedRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        let name = uri_str.rsplit('/').next().unwrap_or(uri_str);
        self.documents
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unresolved schema reference: {uri_str}").into())
    }
}

/// Turns a [`SchemaRef`] into a compiled validator. Split out as a trait so
/// tests can feed schemas from memory instead of disk.
pub trait SchemaCompiler: Send + Sync {
    fn compile(&self, schema: &SchemaRef) -> Result<Validator, ServiceError>;
}

/// Reads schema documents from the filesystem and compiles them under JSON
/// Schema draft 2020-12.
#[derive(Debug, Default)]
pub struct FileSchemaCompiler;

impl FileSchemaCompiler {
    fn read_document(path: &Path) -> Result<Value, ServiceError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("failed to read schema {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ServiceError::Config(format!("invalid JSON in schema {}: {e}", path.display()))
        })
    }
}

impl SchemaCompiler for FileSchemaCompiler {
    fn compile(&self, schema: &SchemaRef) -> Result<Validator, ServiceError> {
        let main = Self::read_document(&schema.main)?;

        let mut documents = HashMap::new();
        for path in &schema.references {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ServiceError::Config(format!(
                        "schema reference has no file name: {}",
                        path.display()
                    ))
                })?;
            documents.insert(name, Self::read_document(path)?);
        }

        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        opts.with_retriever(PreloadedRetriever { documents });
        opts.build(&main).map_err(|e| {
            ServiceError::Config(format!(
                "failed to compile schema {}: {e}",
                schema.main.display()
            ))
        })
    }
}

/// Process-wide cache of compiled schema validators.
pub struct SchemaCache {
    compiler: Box<dyn SchemaCompiler>,
    cache: Mutex<HashMap<String, Arc<Validator>>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Box::new(FileSchemaCompiler))
    }
}

impl SchemaCache {
    pub fn new(compiler: Box<dyn SchemaCompiler>) -> Self {
        Self {
            compiler,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the compiled validator for `schema`, compiling and caching it
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if any schema document is missing,
    /// unparseable, or fails compilation. Errors are not cached.
    pub fn get(&self, schema: &SchemaRef) -> Result<Arc<Validator>, ServiceError> {
        let key = schema.cache_key();

        if let Ok(cache) = self.cache.lock() {
            if let Some(validator) = cache.get(&key) {
                debug!(schema = %schema.main.display(), "Validator cache hit");
                return Ok(Arc::clone(validator));
            }
        }

        // Compile outside the lock; schema files can be large.
        let validator = self.compiler.compile(schema).inspect_err(|e| {
            warn!(schema = %schema.main.display(), error = %e, "Schema compilation failed");
        })?;
        let validator = Arc::new(validator);

        if let Ok(mut cache) = self.cache.lock() {
            // Another request may have compiled the same key meanwhile.
            let entry = cache
                .entry(key)
                .or_insert_with(|| Arc::clone(&validator));
            return Ok(Arc::clone(entry));
        }

        Ok(validator)
    }

    /// Number of cached validators. Test hook.
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .finish()
    }
}
