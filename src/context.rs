//! Codec configuration: the validated model plus the adapter registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    bits::{BitReader, BitWriter},
    compiled::ValidatedModel,
    errors::{CodecError, ModelError},
    marshal::Marshaller,
    schema::Schema,
    unmarshal::Unmarshaller,
    value::Value,
};

/// Custom encoding for every type declaring the adapter's registered name.
///
/// An adapter takes over the whole type: it reads and writes the bits itself, bypassing
/// tags, length fields, padding and element processing.
pub trait Adapter: Send + Sync {
    fn marshal(&self, value: &Value, writer: &mut BitWriter) -> Result<(), CodecError>;

    fn unmarshal(&self, reader: &mut BitReader<'_>) -> Result<Value, CodecError>;
}

/// Shared configuration for [Marshaller] and [Unmarshaller] instances.
#[derive(Clone)]
pub struct CodecContext {
    model: Arc<ValidatedModel>,
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adapters: Vec<&String> = self.adapters.keys().collect();
        adapters.sort();
        f.debug_struct("CodecContext")
            .field("types", &self.model.len())
            .field("adapters", &adapters)
            .finish()
    }
}

impl CodecContext {
    pub fn new(model: impl Into<Arc<ValidatedModel>>) -> Self {
        Self {
            model: model.into(),
            adapters: HashMap::new(),
        }
    }

    /// Validates `schema` and wraps the result.
    pub fn from_schema(schema: Schema) -> Result<Self, ModelError> {
        Ok(Self::new(ValidatedModel::compile(schema)?))
    }

    pub fn register_adapter(
        &mut self,
        name: impl Into<String>,
        adapter: impl Adapter + 'static,
    ) -> &mut Self {
        self.adapters.insert(name.into(), Arc::new(adapter));
        self
    }

    pub fn model(&self) -> &Arc<ValidatedModel> {
        &self.model
    }

    /// Looks up a registered adapter; an unregistered name is a configuration error.
    pub fn adapter(&self, name: &str) -> Result<&dyn Adapter, CodecError> {
        self.adapters
            .get(name)
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| CodecError::NoAdapter(name.to_string()))
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(self)
    }

    pub fn unmarshaller(&self) -> Unmarshaller<'_> {
        Unmarshaller::new(self)
    }
}
