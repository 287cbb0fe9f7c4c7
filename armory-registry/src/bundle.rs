//! Role-specific tool bundles and the startup bundle catalog.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::ToolRegistry;

/// Named required/optional tool-name sets for one agent role.
///
/// Listed names need not exist in a given source registry at apply time;
/// absence becomes a report, never an error. A bundle with an empty
/// required list models a graceful-degradation role that works with
/// whatever optional integrations happen to be present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolBundle {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    optional: Vec<String>,
}

impl ToolBundle {
    /// Creates an empty bundle with the supplied name and description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// Sets the tool names the role cannot function without.
    #[must_use]
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tool names the role uses when available.
    #[must_use]
    pub fn with_optional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the bundle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bundle description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the required tool names.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns the optional tool names.
    #[must_use]
    pub fn optional(&self) -> &[String] {
        &self.optional
    }

    /// Copies this bundle's tools from `source` into `target`.
    ///
    /// Required names missing from `source` are collected into the returned
    /// report; optional names are copied when present and silently skipped
    /// otherwise. Partial success is expected — the caller decides whether
    /// a non-empty report is fatal for its role.
    #[must_use]
    pub fn apply(&self, source: &ToolRegistry, target: &ToolRegistry) -> Vec<String> {
        let mut missing = Vec::new();

        for name in &self.required {
            if let Some(descriptor) = source.get(name) {
                // Already present in the target is fine.
                let _ = target.register_extended(descriptor);
            } else {
                missing.push(name.clone());
            }
        }

        for name in &self.optional {
            if let Some(descriptor) = source.get(name) {
                let _ = target.register_extended(descriptor);
            }
        }

        if !missing.is_empty() {
            debug!(bundle = %self.name, missing = ?missing, "bundle applied with missing required tools");
        }

        missing
    }

    /// Returns all tool names in this bundle, required then optional.
    #[must_use]
    pub fn all_tool_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.required.len() + self.optional.len());
        names.extend(self.required.iter().cloned());
        names.extend(self.optional.iter().cloned());
        names
    }

    /// Returns `true` when the named tool is part of this bundle.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.required.iter().any(|entry| entry == name)
            || self.optional.iter().any(|entry| entry == name)
    }
}

/// Immutable table of bundles constructed at startup and passed by value.
///
/// Replaces mutable package-level bundle globals: every consumer receives
/// its own catalog, so tests stay isolated and construction order carries
/// no hidden coupling.
#[derive(Clone, Debug, Default)]
pub struct BundleCatalog {
    bundles: Vec<ToolBundle>,
}

impl BundleCatalog {
    /// Creates a catalog from the supplied bundles.
    #[must_use]
    pub fn new(bundles: Vec<ToolBundle>) -> Self {
        Self { bundles }
    }

    /// Returns the standard role catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            ToolBundle::new(
                "code_agent",
                "Tools for code exploration, modification, and version control",
            )
            .with_required(["file", "code_edit", "search", "navigate", "git"])
            .with_optional(["bash", "test"]),
            ToolBundle::new("blog_agent", "Tools for blog research, writing, and publishing")
                .with_optional(["rss_feed", "static_links", "blog_publish", "calendar"]),
            ToolBundle::new(
                "blog_orchestrator",
                "Comprehensive tools for multi-phase blog generation with research",
            )
            .with_optional([
                "rss_feed",
                "static_links",
                "blog_publish",
                "calendar",
                "web_scrape",
            ]),
            ToolBundle::new("research", "Tools for web scraping and information gathering")
                .with_optional(["web_scrape", "rss_feed"]),
            ToolBundle::new("utility", "Tools for job management and utilities")
                .with_optional(["get_job_status", "list_jobs", "cancel_job"]),
        ])
    }

    /// Returns the bundle registered under the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolBundle> {
        self.bundles.iter().find(|bundle| bundle.name() == name)
    }

    /// Iterates over all bundles in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolBundle> {
        self.bundles.iter()
    }

    /// Returns the number of bundles in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Returns `true` when the catalog holds no bundles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
