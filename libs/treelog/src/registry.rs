//! Type registry: type name ↔ stream-local index ↔ record factory.
//!
//! One registry is owned by each writer and each reader. Indices are dense,
//! 1-based and assigned in first-seen order, so they mean nothing outside the
//! stream that assigned them.

use std::collections::HashMap;
use std::sync::Arc;

use prost_reflect::{MessageDescriptor, ReflectMessage};

use crate::chunk::TypeIndex;
use crate::error::{Result, StreamError};
use crate::generic::GenericRecord;
use crate::instance::{RecordInstance, StaticMessage};
use crate::schema::{Schema, TypeDescriptor};

/// Builds an empty statically typed message.
pub type StaticFactory = fn() -> Box<dyn StaticMessage>;

/// Source of statically linked message types, looked up by full type name.
pub trait StaticTypes: Send + Sync {
    fn factory(&self, name: &str) -> Option<StaticFactory>;

    /// Reflected descriptor of a static type, if the provider has one.
    fn descriptor(&self, _name: &str) -> Option<MessageDescriptor> {
        None
    }
}

#[derive(Clone)]
struct StaticType {
    factory: StaticFactory,
    descriptor: MessageDescriptor,
}

/// In-memory [`StaticTypes`] filled from generated `prost` types.
///
/// ```ignore
/// let types = StaticTypeSet::default().with::<proto::Quote>().with::<proto::Book>();
/// ```
#[derive(Clone, Default)]
pub struct StaticTypeSet {
    types: HashMap<String, StaticType>,
}

fn new_static<T: ReflectMessage + Default + 'static>() -> Box<dyn StaticMessage> {
    Box::new(T::default())
}

impl StaticTypeSet {
    pub fn with<T: ReflectMessage + Default + 'static>(mut self) -> Self {
        self.insert::<T>();
        self
    }

    pub fn insert<T: ReflectMessage + Default + 'static>(&mut self) {
        let descriptor = T::default().descriptor();
        self.types.insert(
            descriptor.full_name().to_owned(),
            StaticType { factory: new_static::<T>, descriptor },
        );
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

impl StaticTypes for StaticTypeSet {
    fn factory(&self, name: &str) -> Option<StaticFactory> {
        self.types.get(name).map(|t| t.factory)
    }

    fn descriptor(&self, name: &str) -> Option<MessageDescriptor> {
        self.types.get(name).map(|t| t.descriptor.clone())
    }
}

#[derive(Clone)]
enum Factory {
    Static(StaticFactory),
    Generic(Arc<TypeDescriptor>),
}

/// One registered type. Created once per name; never changes afterwards.
#[derive(Clone)]
pub struct TypeEntry {
    name: String,
    index: TypeIndex,
    descriptor: Option<Arc<TypeDescriptor>>,
    factory: Factory,
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> TypeIndex {
        self.index
    }

    pub fn descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        self.descriptor.as_ref()
    }

    pub fn is_static(&self) -> bool {
        matches!(self.factory, Factory::Static(_))
    }

    /// Build an empty record of this type.
    pub fn instantiate(&self) -> RecordInstance {
        match &self.factory {
            Factory::Static(factory) => RecordInstance::Static(factory()),
            Factory::Generic(descriptor) => {
                RecordInstance::Generic(GenericRecord::new(Arc::clone(descriptor)))
            }
        }
    }
}

impl std::fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("static", &self.is_static())
            .finish()
    }
}

pub struct Registry {
    entries: Vec<TypeEntry>,
    by_name: HashMap<String, TypeIndex>,
    types: Arc<dyn StaticTypes>,
    forced_dynamic: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry with no static types: every type decodes generically.
    pub fn new() -> Self {
        Self::with_static_types(Arc::new(StaticTypeSet::default()), false)
    }

    /// With `forced_dynamic`, static types are ignored when choosing the
    /// factory but their descriptors are still used.
    pub fn with_static_types(types: Arc<dyn StaticTypes>, forced_dynamic: bool) -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            types,
            forced_dynamic,
        }
    }

    /// Register `name`, or return its existing entry. The flag is `true` when
    /// the entry was created by this call.
    pub fn register(&mut self, name: &str, schema: Option<Schema>) -> Result<(&TypeEntry, bool)> {
        if let Some(&index) = self.by_name.get(name) {
            return Ok((&self.entries[slot(index)], false));
        }

        let schema = schema.or_else(|| {
            self.types
                .descriptor(name)
                .map(|desc| Schema::from_descriptor(&desc))
        });
        let descriptor = schema.map(|schema| Arc::new(TypeDescriptor::new(name, schema)));
        let static_factory = if self.forced_dynamic {
            None
        } else {
            self.types.factory(name)
        };
        let factory = match (static_factory, &descriptor) {
            (Some(factory), _) => Factory::Static(factory),
            (None, Some(descriptor)) => Factory::Generic(Arc::clone(descriptor)),
            (None, None) => return Err(StreamError::UnknownProtoType(name.to_owned())),
        };

        let index = TypeIndex(self.entries.len() as u64 + 1);
        tracing::debug!(
            name,
            %index,
            fields = descriptor.as_ref().map_or(0, |d| d.fields().len()),
            generic = matches!(factory, Factory::Generic(_)),
            "type registered"
        );
        self.entries.push(TypeEntry {
            name: name.to_owned(),
            index,
            descriptor,
            factory,
        });
        self.by_name.insert(name.to_owned(), index);
        Ok((&self.entries[slot(index)], true))
    }

    /// O(1) lookup of a declared index.
    pub fn resolve(&self, index: TypeIndex) -> Result<&TypeEntry> {
        if index.0 == 0 || index.0 > self.entries.len() as u64 {
            return Err(StreamError::UnknownTypeIndex {
                index: index.0,
                declared: self.entries.len(),
            });
        }
        Ok(&self.entries[slot(index)])
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeEntry> {
        self.by_name.get(name).map(|&index| &self.entries[slot(index)])
    }

    /// Descriptor of a registered type, for decoding nested generic messages.
    pub fn descriptor(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.lookup(name)
            .and_then(|entry| entry.descriptor.clone())
            .ok_or_else(|| StreamError::UnknownProtoType(name.to_owned()))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.iter()
    }
}

fn slot(index: TypeIndex) -> usize {
    (index.0 - 1) as usize
}
