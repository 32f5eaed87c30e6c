use ahash::AHashMap as HashMap;

/// Lifecycle transitions surfaced by the cluster watchers.
///
/// Watch restarts are replayed as `Added` events; every handler downstream is
/// idempotent, so replays converge instead of duplicating state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceEvent {
    pub kind: EventKind,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEvent {
    pub kind: EventKind,
    pub namespace: String,
    pub name: String,
    pub cluster_ip: String,
    pub annotations: HashMap<String, String>,
}

// === impl ServiceEvent ===

impl ServiceEvent {
    /// Names an existing macro group by SDN id; used verbatim.
    pub const MACRO_GROUP_ID_ANNOTATION: &'static str = "network-macro-group.id";

    /// Names an existing macro group; resolved to an id before use.
    pub const MACRO_GROUP_NAME_ANNOTATION: &'static str = "network-macro-group.name";

    /// Pins the service to a zone, which must be the service's own namespace.
    pub const ZONE_ANNOTATION: &'static str = "zone";

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(|v| v.as_str())
    }
}
