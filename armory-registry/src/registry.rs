//! Concurrent tool catalog with change notification and export.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use armory_capabilities::CapabilityChecker;
use armory_primitives::{CapabilityId, ToolOutcome};
use serde_json::Value;
use tracing::debug;

use crate::grammar::{
    GbnfGrammar, GrammarError, GrammarResult, ToolDefinition, multi_tool_call_schema,
    schema_to_gbnf,
};
use crate::tool::{Tool, ToolCategory, ToolDescriptor, ToolError, ToolOptionality, ToolResult};

/// Kind of change a registry event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEventKind {
    /// A tool was added to the registry.
    Registered,
    /// A tool was removed from the registry.
    Unregistered,
}

/// Change notification delivered to registry listeners.
#[derive(Clone, Debug)]
pub struct RegistryEvent {
    kind: RegistryEventKind,
    name: String,
    descriptor: ToolDescriptor,
}

impl RegistryEvent {
    /// Returns the kind of change.
    #[must_use]
    pub const fn kind(&self) -> RegistryEventKind {
        self.kind
    }

    /// Returns the name of the affected tool.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the affected descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

/// Synchronous observer invoked on every registry change.
pub type RegistryListener = Box<dyn Fn(&RegistryEvent) + Send + Sync>;

struct Inner {
    tools: HashMap<String, ToolDescriptor>,
    listeners: Vec<RegistryListener>,
}

/// Concurrent-safe catalog of tool descriptors.
///
/// Lookups and listings take the read side of one readers-writer lock;
/// registration, unregistration, and listener dispatch take the write side
/// and therefore exclude each other. Listeners run while the write lock is
/// held: they must return quickly and must not call back into the registry,
/// or they deadlock by construction.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let names: Vec<_> = inner.tools.keys().cloned().collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl Clone for ToolRegistry {
    /// Clones the membership only. Descriptors are shared (`Arc`-backed), so
    /// the copy is shallow, but mutating the clone's membership never
    /// affects the source. Listeners are not carried over.
    fn clone(&self) -> Self {
        let inner = self.inner.read().expect("tool registry poisoned");
        Self {
            inner: RwLock::new(Inner {
                tools: inner.tools.clone(),
                listeners: Vec::new(),
            }),
        }
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tools: HashMap::new(),
                listeners: Vec::new(),
            }),
        }
    }

    /// Registers a plain tool, wrapping it in a metadata-less descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present;
    /// the registry is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register<T>(&self, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        self.register_extended(ToolDescriptor::basic(tool))
    }

    /// Registers a full descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present;
    /// the registry is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_extended(&self, descriptor: ToolDescriptor) -> ToolResult<()> {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let name = descriptor.name().to_owned();
        if inner.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        debug!(tool = %name, "tool registered");
        inner.tools.insert(name.clone(), descriptor.clone());
        notify(&inner, &RegistryEvent {
            kind: RegistryEventKind::Registered,
            name,
            descriptor,
        });

        Ok(())
    }

    /// Removes a tool from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] if the name is absent; the
    /// registry is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn unregister(&self, name: &str) -> ToolResult<()> {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let Some(descriptor) = inner.tools.remove(name) else {
            return Err(ToolError::UnknownTool {
                name: name.to_owned(),
            });
        };

        debug!(tool = %name, "tool unregistered");
        notify(&inner, &RegistryEvent {
            kind: RegistryEventKind::Unregistered,
            name: name.to_owned(),
            descriptor,
        });

        Ok(())
    }

    /// Returns the descriptor registered under the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        let inner = self.inner.read().ok()?;
        inner.tools.get(name).cloned()
    }

    /// Returns every registered descriptor. No ordering guarantee.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.tools.values().cloned().collect()
    }

    /// Returns the names of all registered tools. No ordering guarantee.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.tools.keys().cloned().collect()
    }

    /// Returns the number of registered tools.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.tools.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a tool by name and executes it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found or
    /// propagates [`ToolError::Execution`] when the implementation fails.
    pub async fn invoke(&self, name: &str, input: Value) -> ToolResult<ToolOutcome> {
        let descriptor = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        descriptor.execute(input).await
    }

    /// Returns metadata-bearing tools in the supplied category.
    ///
    /// Tools without metadata are excluded, never matched.
    #[must_use]
    pub fn filter_by_category(&self, category: ToolCategory) -> Vec<ToolDescriptor> {
        self.filter(|descriptor| {
            descriptor
                .metadata()
                .is_some_and(|meta| meta.category() == category)
        })
    }

    /// Returns metadata-bearing tools with the supplied optionality.
    ///
    /// Tools without metadata are excluded, never matched.
    #[must_use]
    pub fn filter_by_optionality(&self, optionality: ToolOptionality) -> Vec<ToolDescriptor> {
        self.filter(|descriptor| {
            descriptor
                .metadata()
                .is_some_and(|meta| meta.optionality() == optionality)
        })
    }

    /// Returns all required tools.
    #[must_use]
    pub fn filter_required(&self) -> Vec<ToolDescriptor> {
        self.filter_by_optionality(ToolOptionality::Required)
    }

    /// Returns all optional tools.
    #[must_use]
    pub fn filter_optional(&self) -> Vec<ToolDescriptor> {
        self.filter_by_optionality(ToolOptionality::Optional)
    }

    fn filter<F>(&self, keep: F) -> Vec<ToolDescriptor>
    where
        F: Fn(&ToolDescriptor) -> bool,
    {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .tools
            .values()
            .filter(|descriptor| keep(descriptor))
            .cloned()
            .collect()
    }

    /// Returns tools whose required capabilities are all satisfied.
    ///
    /// Tools without metadata are always available.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list_available(&self, checker: &dyn CapabilityChecker) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .tools
            .values()
            .filter(|descriptor| match descriptor.metadata() {
                Some(meta) => meta
                    .requires_capabilities()
                    .iter()
                    .all(|capability| checker.check(capability)),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Returns tools that cannot be used right now, keyed by name, with the
    /// exact capabilities each one is missing.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list_unavailable(
        &self,
        checker: &dyn CapabilityChecker,
    ) -> HashMap<String, Vec<CapabilityId>> {
        let inner = self.inner.read().expect("tool registry poisoned");
        let mut unavailable = HashMap::new();
        for (name, descriptor) in &inner.tools {
            let Some(meta) = descriptor.metadata() else {
                continue;
            };

            let missing = checker.check_all(meta.requires_capabilities());
            if !missing.is_empty() {
                unavailable.insert(name.clone(), missing);
            }
        }
        unavailable
    }

    /// Adds a listener invoked synchronously, in registration order, on
    /// every register/unregister event.
    ///
    /// The callback runs while the registry's write lock is held: keep it
    /// fast and do not call back into the registry from inside it.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        inner.listeners.push(Box::new(listener));
    }

    /// Copies every tool from `other` into this registry.
    ///
    /// The merge is atomic: a full collision scan runs first, and any shared
    /// name fails the whole operation without copying anything.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MergeConflict`] naming the first colliding tool.
    ///
    /// # Panics
    ///
    /// Panics if either registry lock is poisoned.
    pub fn merge(&self, other: &ToolRegistry) -> ToolResult<()> {
        let other_inner = other.inner.read().expect("tool registry poisoned");
        let mut inner = self.inner.write().expect("tool registry poisoned");

        for name in other_inner.tools.keys() {
            if inner.tools.contains_key(name) {
                return Err(ToolError::MergeConflict { name: name.clone() });
            }
        }

        for (name, descriptor) in &other_inner.tools {
            inner.tools.insert(name.clone(), descriptor.clone());
            notify(&inner, &RegistryEvent {
                kind: RegistryEventKind::Registered,
                name: name.clone(),
                descriptor: descriptor.clone(),
            });
        }

        Ok(())
    }

    /// Exports (name, description, input schema) triples for prompting.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .tools
            .values()
            .map(|descriptor| {
                ToolDefinition::new(
                    descriptor.name(),
                    descriptor.description(),
                    descriptor
                        .metadata()
                        .and_then(|meta| meta.schema().cloned()),
                )
            })
            .collect()
    }

    /// Compiles a grammar constraining generation to valid calls against
    /// every registered schema.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::NoSchemas`] when no registered tool carries
    /// an input schema, or a conversion error for unsupported schemas.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn tool_call_grammar(&self) -> GrammarResult<GbnfGrammar> {
        let schemas: BTreeMap<_, _> = {
            let inner = self.inner.read().expect("tool registry poisoned");
            inner
                .tools
                .iter()
                .filter_map(|(name, descriptor)| {
                    descriptor
                        .metadata()
                        .and_then(|meta| meta.schema())
                        .map(|schema| (name.clone(), schema.clone()))
                })
                .collect()
        };

        if schemas.is_empty() {
            return Err(GrammarError::NoSchemas);
        }

        let text = schema_to_gbnf(&multi_tool_call_schema(&schemas))?;
        Ok(GbnfGrammar::new(text))
    }
}

/// Must be called with the write lock held.
fn notify(inner: &Inner, event: &RegistryEvent) {
    for listener in &inner.listeners {
        listener(event);
    }
}
