//! Dynamic child resolvers.
//!
//! A node of kind `synthetic-parent:<name>` expands at read time into
//! transient children produced by the resolver registered under `<name>`.
//! Resolvers query an external collaborator (top categories, important
//! documents) and never persist what they return.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arbor_core::{
    ArborConfig, ArborError, ArborResult, Node, ResolverError, ResolverSettings, TransientChild,
};

/// Limit applied to a registered resolver that has no configured settings.
pub const DEFAULT_RESOLVER_LIMIT: usize = 10;

/// Payload field a synthetic parent may use to refine its collaborator query.
pub const CRITERIA_FIELD: &str = "criteria";

/// One row returned by a [`TopNSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopNItem {
    pub label: String,
    pub target: String,
}

impl TopNItem {
    pub fn new(label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: target.into(),
        }
    }
}

/// Query interface implemented by collaborating components.
///
/// Results must be deterministic for a given collaborator state, since
/// they end up in cached snapshots.
pub trait TopNSource: Send + Sync {
    fn top_n(&self, criteria: &str, limit: usize, language: &str) -> ArborResult<Vec<TopNItem>>;
}

/// Produces transient children for a synthetic-parent node.
pub trait DynamicNodeResolver: Send + Sync {
    /// Name matched against `synthetic-parent:<name>`.
    fn name(&self) -> &str;

    /// At most `limit` children for `node` in `language`.
    fn resolve(&self, node: &Node, language: &str, limit: usize) -> ArborResult<Vec<TransientChild>>;
}

// ============================================================================
// COLLABORATOR RESOLVER
// ============================================================================

/// Adapts a [`TopNSource`] to the resolver contract.
///
/// The criteria string comes from the node payload's `criteria` field when
/// present, otherwise from the resolver's default.
pub struct CollaboratorResolver {
    name: String,
    default_criteria: String,
    source: Arc<dyn TopNSource>,
}

impl CollaboratorResolver {
    pub fn new(name: impl Into<String>, source: Arc<dyn TopNSource>) -> Self {
        let name = name.into();
        Self {
            default_criteria: name.clone(),
            name,
            source,
        }
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.default_criteria = criteria.into();
        self
    }

    fn criteria_for<'a>(&'a self, node: &'a Node) -> &'a str {
        node.payload
            .get(CRITERIA_FIELD)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&self.default_criteria)
    }
}

impl DynamicNodeResolver for CollaboratorResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, node: &Node, language: &str, limit: usize) -> ArborResult<Vec<TransientChild>> {
        let items = self
            .source
            .top_n(self.criteria_for(node), limit, language)
            .map_err(|e| ResolverError::CollaboratorFailed {
                resolver: self.name.clone(),
                reason: e.to_string(),
            })?;

        // Collaborators may ignore the limit; truncation keeps their order.
        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| TransientChild {
                label: item.label,
                target: item.target,
                resolver: self.name.clone(),
            })
            .collect())
    }
}

impl std::fmt::Debug for CollaboratorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorResolver")
            .field("name", &self.name)
            .field("default_criteria", &self.default_criteria)
            .finish()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Resolvers by name plus their configured limit and enabled flag.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn DynamicNodeResolver>>,
    settings: BTreeMap<String, ResolverSettings>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry carrying the configured resolver settings. Resolvers are
    /// registered separately.
    pub fn from_config(config: &ArborConfig) -> Self {
        Self {
            resolvers: HashMap::new(),
            settings: config.resolvers.clone(),
        }
    }

    /// Register a resolver under its own name, replacing any previous one.
    pub fn register(&mut self, resolver: Arc<dyn DynamicNodeResolver>) -> &mut Self {
        let name = resolver.name().to_string();
        tracing::debug!(resolver = %name, "registered dynamic node resolver");
        self.resolvers.insert(name, resolver);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DynamicNodeResolver>) -> Self {
        self.register(resolver);
        self
    }

    pub fn with_settings(mut self, name: impl Into<String>, settings: ResolverSettings) -> Self {
        self.settings.insert(name.into(), settings);
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn limit_for(&self, name: &str) -> usize {
        self.settings
            .get(name)
            .map(|s| s.limit)
            .unwrap_or(DEFAULT_RESOLVER_LIMIT)
    }

    /// Resolve a node, reporting why nothing could be produced.
    ///
    /// Non-synthetic nodes yield an empty list.
    pub fn try_resolve(&self, node: &Node, language: &str) -> ArborResult<Vec<TransientChild>> {
        let Some(name) = node.kind.resolver_name() else {
            return Ok(Vec::new());
        };
        let resolver = self
            .resolvers
            .get(name)
            .ok_or_else(|| ResolverError::NotRegistered {
                name: name.to_string(),
            })?;
        if self.settings.get(name).is_some_and(|s| !s.enabled) {
            return Err(ResolverError::Disabled {
                name: name.to_string(),
            }
            .into());
        }
        let limit = self.limit_for(name);
        let mut children = resolver.resolve(node, language, limit)?;
        children.truncate(limit);
        Ok(children)
    }

    /// Resolve a node; a missing, disabled or failing resolver is logged
    /// and yields no children so the rest of the tree still renders.
    pub fn resolve(&self, node: &Node, language: &str) -> Vec<TransientChild> {
        match self.try_resolve(node, language) {
            Ok(children) => children,
            Err(e) => {
                log_resolver_failure(node, &e);
                Vec::new()
            }
        }
    }
}

fn log_resolver_failure(node: &Node, error: &ArborError) {
    tracing::warn!(
        node_id = %node.id,
        tree_id = %node.tree_id,
        kind = %node.kind,
        error = %error,
        "dynamic children unavailable"
    );
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &names)
            .field("settings", &self.settings)
            .finish()
    }
}
