//! Layered cluster definition lookup
//!
//! Providers are queried in priority order and the first match wins. A
//! device's custom clusters sit in front of the built-in library, so a
//! custom cluster whose id collides with a built-in one replaces it for
//! that device.

use crate::cluster::Cluster;
use crate::library;
use crate::types::ProtocolError;
use std::fmt;
use std::sync::Arc;

/// Source of cluster definitions
pub trait ClusterProvider: Send + Sync {
    /// Look up by id, preferring a definition for `manufacturer_code`
    fn by_id(&self, id: u16, manufacturer_code: Option<u16>) -> Option<Arc<Cluster>>;

    fn by_name(&self, name: &str) -> Option<Arc<Cluster>>;
}

/// Pick among clusters sharing an id: exact manufacturer, then generic, then any
fn pick_by_id<'a>(
    clusters: impl Iterator<Item = &'a Arc<Cluster>>,
    id: u16,
    manufacturer_code: Option<u16>,
) -> Option<Arc<Cluster>> {
    let candidates: Vec<&Arc<Cluster>> = clusters.filter(|c| c.id == id).collect();
    candidates
        .iter()
        .find(|c| manufacturer_code.is_some() && c.manufacturer_code == manufacturer_code)
        .or_else(|| candidates.iter().find(|c| c.manufacturer_code.is_none()))
        .or_else(|| candidates.first())
        .map(|c| Arc::clone(c))
}

/// Per-device custom cluster definitions
#[derive(Debug, Clone, Default)]
pub struct CustomClusters {
    clusters: Vec<Arc<Cluster>>,
}

impl CustomClusters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing one with the same name
    pub fn insert(&mut self, cluster: Cluster) {
        self.clusters.retain(|c| c.name != cluster.name);
        self.clusters.push(Arc::new(cluster));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }
}

impl ClusterProvider for CustomClusters {
    fn by_id(&self, id: u16, manufacturer_code: Option<u16>) -> Option<Arc<Cluster>> {
        pick_by_id(self.clusters.iter(), id, manufacturer_code)
    }

    fn by_name(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.iter().find(|c| c.name == name).cloned()
    }
}

/// The built-in cluster library
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinClusters;

impl ClusterProvider for BuiltinClusters {
    fn by_id(&self, id: u16, manufacturer_code: Option<u16>) -> Option<Arc<Cluster>> {
        pick_by_id(library::clusters().iter(), id, manufacturer_code)
    }

    fn by_name(&self, name: &str) -> Option<Arc<Cluster>> {
        library::clusters().iter().find(|c| c.name == name).cloned()
    }
}

/// Cluster reference by name or numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClusterKey {
    Name(String),
    Id(u16),
}

impl From<&str> for ClusterKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ClusterKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u16> for ClusterKey {
    fn from(id: u16) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Id(id) => write!(f, "{id:#06x}"),
        }
    }
}

/// Ordered list of cluster providers
#[derive(Clone)]
pub struct ClusterRegistry {
    providers: Vec<Arc<dyn ClusterProvider>>,
}

impl ClusterRegistry {
    /// Registry with only the built-in library
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            providers: vec![Arc::new(BuiltinClusters)],
        }
    }

    /// Registry for a device: its custom clusters, then the built-in library
    #[must_use]
    pub fn with_custom(custom: CustomClusters) -> Self {
        if custom.is_empty() {
            return Self::builtin();
        }
        Self {
            providers: vec![Arc::new(custom), Arc::new(BuiltinClusters)],
        }
    }

    /// Registry over an explicit provider list, highest priority first
    #[must_use]
    pub fn from_providers(providers: Vec<Arc<dyn ClusterProvider>>) -> Self {
        Self { providers }
    }

    /// Resolve a cluster for encoding
    ///
    /// Unknown numeric ids resolve to an empty definition named after the
    /// id. Unknown names are an error.
    pub fn resolve(
        &self,
        key: &ClusterKey,
        manufacturer_code: Option<u16>,
    ) -> Result<Arc<Cluster>, ProtocolError> {
        match key {
            ClusterKey::Id(id) => Ok(self.by_id(*id, manufacturer_code)),
            ClusterKey::Name(name) => {
                for (idx, provider) in self.providers.iter().enumerate() {
                    if let Some(found) = provider.by_name(name) {
                        let overriding = self.providers[..idx]
                            .iter()
                            .find_map(|p| p.by_id(found.id, manufacturer_code));
                        return Ok(overriding.unwrap_or(found));
                    }
                }
                Err(ProtocolError::UnknownCluster(name.clone()))
            }
        }
    }

    /// Resolve by id, never failing
    #[must_use]
    pub fn by_id(&self, id: u16, manufacturer_code: Option<u16>) -> Arc<Cluster> {
        self.providers
            .iter()
            .find_map(|p| p.by_id(id, manufacturer_code))
            .unwrap_or_else(|| Arc::new(Cluster::new(id, &id.to_string())))
    }
}

impl fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}
