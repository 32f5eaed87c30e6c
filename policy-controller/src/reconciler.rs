use crate::bootstrap::Bootstrap;
use ahash::AHashMap as HashMap;
use anyhow::{Context, Result};
use sdn_policy_controller_core::{
    EventKind, Ipv4Subnet, NamespaceEvent, ServiceEvent, SubnetPool,
};
use sdn_policy_controller_sdn_api::{
    self as sdn_api,
    types::{self, AclEntry, NetworkMacro},
    Client, Direction, PriorityAllocator,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-zone entries land above this offset, below the SDN's reserved bands.
const ZONE_PRIORITY_OFFSET: u32 = 300;

/// The namespace whose services every zone may reach.
const DEFAULT_NAMESPACE: &str = "default";

/// Inconsistent service annotations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("annotated macro group {0:?} is not known to the SDN")]
    UnknownGroup(String),

    #[error("annotated zone {0:?} is not managed by this controller")]
    UnknownZone(String),

    #[error("annotated zone {zone:?} does not match namespace {namespace:?}")]
    ZoneMismatch { zone: String, namespace: String },

    #[error("namespace {0:?} is not managed by this controller")]
    UnmanagedNamespace(String),
}

/// In-memory record of a namespace this controller owns.
#[derive(Debug, Default)]
struct ManagedZone {
    zone_id: String,

    /// Empty between zone creation and the first ACL pass.
    macro_group_id: String,

    /// Service name to network macro id.
    macros: HashMap<String, String>,
}

#[derive(Debug)]
struct ZoneSubnet {
    id: String,
    cidr: Ipv4Subnet,
}

/// Translates namespace and service events into idempotent SDN operations.
///
/// All state lives on this one value and is only touched from the event
/// loop, so handlers run without locks. Exactly one event is in flight at a
/// time; every SDN call completes before the next event is dequeued.
pub struct Reconciler {
    sdn: Client,
    enterprise_id: String,
    domain_id: String,
    ingress_template_id: String,
    egress_template_id: String,

    /// Prefix length of the blocks carved out for zones.
    subnet_prefix: u8,
    pool: SubnetPool,
    priorities: PriorityAllocator,

    /// Namespace name to managed zone record.
    zones: HashMap<String, ManagedZone>,

    /// Zone id to the subnets allocated for it.
    subnets: HashMap<String, Vec<ZoneSubnet>>,
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(boot: Bootstrap, pool: SubnetPool, subnet_prefix: u8) -> Self {
        Self {
            sdn: boot.client,
            enterprise_id: boot.enterprise_id,
            domain_id: boot.domain_id,
            ingress_template_id: boot.ingress_template_id,
            egress_template_id: boot.egress_template_id,
            subnet_prefix,
            pool,
            priorities: PriorityAllocator::default(),
            zones: HashMap::default(),
            subnets: HashMap::default(),
        }
    }

    /// Drives reconciliation until the stop channel fires or both inputs
    /// close. Reconciliation failures are logged and the event dropped; the
    /// loop keeps consuming.
    pub async fn run(
        mut self,
        mut namespaces: mpsc::Receiver<NamespaceEvent>,
        mut services: mpsc::Receiver<ServiceEvent>,
        mut stop: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                ev = namespaces.recv() => match ev {
                    Some(ev) => {
                        if let Err(error) = self.handle_namespace_event(&ev).await {
                            warn!(%error, namespace = %ev.name, "failed to reconcile namespace event");
                        }
                    }
                    None => return,
                },

                ev = services.recv() => match ev {
                    Some(ev) => {
                        if let Err(error) = self.handle_service_event(&ev).await {
                            warn!(%error, namespace = %ev.namespace, service = %ev.name, "failed to reconcile service event");
                        }
                    }
                    None => return,
                },

                _ = stop.recv() => {
                    info!("stopping");
                    return;
                }
            }
        }
    }

    pub(crate) async fn handle_namespace_event(&mut self, ev: &NamespaceEvent) -> Result<()> {
        debug!(namespace = %ev.name, kind = ?ev.kind, "namespace event");
        match ev.kind {
            EventKind::Added => self.namespace_added(&ev.name).await,
            EventKind::Deleted => self.namespace_deleted(&ev.name).await,
        }
    }

    pub(crate) async fn handle_service_event(&mut self, ev: &ServiceEvent) -> Result<()> {
        debug!(namespace = %ev.namespace, service = %ev.name, kind = ?ev.kind, "service event");
        match ev.kind {
            EventKind::Added => self.service_added(ev).await,
            EventKind::Deleted => self.service_deleted(ev).await,
        }
    }

    async fn namespace_added(&mut self, name: &str) -> Result<()> {
        if self.zones.contains_key(name) {
            // A replay, e.g. after a watch restart. Converge on whatever the
            // SDN already holds rather than provisioning anew.
            let zone_id = self
                .sdn
                .zone_id(&self.domain_id, name)
                .await
                .context("tracked zone is missing from the SDN")?;
            self.create_zone_acls(name, &zone_id).await?;
            if let Some(zone) = self.zones.get_mut(name) {
                zone.zone_id = zone_id;
            }
            return Ok(());
        }

        let zone_id = self.sdn.create_zone(&self.domain_id, name).await?;
        let subnet = self.pool.alloc(self.subnet_prefix)?;
        let subnet_id = match self
            .sdn
            .create_subnet(&format!("{}-0", name), &zone_id, &subnet)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                if let Err(error) = self.pool.free(subnet) {
                    warn!(%error, %subnet, "failed to return subnet to the pool");
                }
                return Err(e.into());
            }
        };
        info!(namespace = %name, %zone_id, %subnet, "zone provisioned");

        self.zones.insert(
            name.to_string(),
            ManagedZone {
                zone_id: zone_id.clone(),
                ..ManagedZone::default()
            },
        );
        self.subnets.entry(zone_id.clone()).or_default().push(ZoneSubnet {
            id: subnet_id,
            cidr: subnet,
        });

        self.create_zone_acls(name, &zone_id).await
    }

    async fn namespace_deleted(&mut self, name: &str) -> Result<()> {
        let zone_id = match self.zones.get(name) {
            Some(zone) => zone.zone_id.clone(),
            None => return self.namespace_deleted_untracked(name).await,
        };

        self.delete_zone_acls(name).await?;

        // The SDN may be ahead of local state here, so per-subnet cleanup
        // failures degrade to warnings.
        if let Some(list) = self.subnets.remove(&zone_id) {
            for subnet in list {
                if let Err(error) = self.sdn.delete_subnet(&subnet.id).await {
                    warn!(%error, subnet = %subnet.id, namespace = %name, "failed to delete subnet");
                }
                if let Err(error) = self.pool.free(subnet.cidr) {
                    warn!(%error, subnet = %subnet.cidr, namespace = %name, "failed to free subnet");
                }
            }
        }

        self.zones.remove(name);
        self.sdn.delete_zone(&zone_id).await?;
        info!(namespace = %name, %zone_id, "zone deprovisioned");
        Ok(())
    }

    /// Best-effort teardown for a namespace nothing tracks locally: if the
    /// SDN still has a zone for it, its ACLs and the zone itself go away.
    async fn namespace_deleted_untracked(&mut self, name: &str) -> Result<()> {
        let zone_id = match self.sdn.zone_id(&self.domain_id, name).await {
            Ok(id) => id,
            Err(sdn_api::Error::NotFound { .. }) => {
                warn!(namespace = %name, "deleted namespace has no zone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        info!(namespace = %name, %zone_id, "deleting zone not tracked locally");

        let group_name = if name == DEFAULT_NAMESPACE {
            DEFAULT_NAMESPACE.to_string()
        } else {
            zone_group_name(name)
        };
        match self
            .sdn
            .network_macro_group_id(&self.enterprise_id, &group_name)
            .await
        {
            Ok(group_id) => {
                let entry = if name == DEFAULT_NAMESPACE {
                    default_zone_entry(&group_id)
                } else {
                    specific_zone_entry(name, &zone_id, &group_id)
                };
                if let Err(error) = self.delete_entry_pair(&entry).await {
                    warn!(%error, namespace = %name, "failed to delete zone ACL entries");
                }
                if let Err(error) = self.sdn.delete_network_macro_group(&group_id).await {
                    warn!(%error, namespace = %name, "failed to delete macro group");
                }
            }
            Err(sdn_api::Error::NotFound { .. }) => {
                debug!(namespace = %name, "no macro group to delete");
            }
            Err(e) => return Err(e.into()),
        }

        self.sdn.delete_zone(&zone_id).await?;
        Ok(())
    }

    async fn create_zone_acls(&mut self, name: &str, zone_id: &str) -> Result<()> {
        if name == DEFAULT_NAMESPACE {
            self.create_default_zone_acls(zone_id).await
        } else {
            self.create_specific_zone_acls(name, zone_id).await
        }
    }

    /// Grants every zone access to services published in the default
    /// namespace: forward entries at priority 1 from anywhere to the
    /// default macro group.
    async fn create_default_zone_acls(&mut self, zone_id: &str) -> Result<()> {
        let group_id = self
            .sdn
            .create_network_macro_group(&self.enterprise_id, DEFAULT_NAMESPACE)
            .await?;
        let zone = self.zones.entry(DEFAULT_NAMESPACE.to_string()).or_default();
        zone.zone_id = zone_id.to_string();
        zone.macro_group_id = group_id.clone();

        let entry = default_zone_entry(&group_id);
        self.sdn
            .create_acl_entry(&self.ingress_template_id, Direction::Ingress, &entry)
            .await?;
        self.sdn
            .create_acl_entry(&self.egress_template_id, Direction::Egress, &entry)
            .await?;
        Ok(())
    }

    /// Grants a zone access to its own services: forward entries between the
    /// zone and its macro group, at freshly allocated priorities.
    async fn create_specific_zone_acls(&mut self, name: &str, zone_id: &str) -> Result<()> {
        let group_id = self
            .sdn
            .create_network_macro_group(&self.enterprise_id, &zone_group_name(name))
            .await?;
        {
            let zone = self.zones.entry(name.to_string()).or_default();
            zone.zone_id = zone_id.to_string();
            zone.macro_group_id = group_id.clone();
        }

        let mut entry = specific_zone_entry(name, zone_id, &group_id);
        entry.priority = ZONE_PRIORITY_OFFSET + self.priorities.next();
        self.sdn
            .create_acl_entry(&self.ingress_template_id, Direction::Ingress, &entry)
            .await?;
        entry.priority = ZONE_PRIORITY_OFFSET + self.priorities.next();
        self.sdn
            .create_acl_entry(&self.egress_template_id, Direction::Egress, &entry)
            .await?;
        Ok(())
    }

    async fn delete_zone_acls(&mut self, name: &str) -> Result<()> {
        let Some(zone) = self.zones.get(name) else {
            return Ok(());
        };
        let group_id = zone.macro_group_id.clone();
        let entry = if name == DEFAULT_NAMESPACE {
            default_zone_entry(&group_id)
        } else {
            specific_zone_entry(name, &zone.zone_id, &group_id)
        };

        self.delete_entry_pair(&entry).await?;

        if !group_id.is_empty() {
            self.sdn.delete_network_macro_group(&group_id).await?;
            if let Some(zone) = self.zones.get_mut(name) {
                zone.macro_group_id.clear();
            }
        }
        Ok(())
    }

    /// Deletes the ingress and egress instances of a zone entry. Entries
    /// already gone are success.
    async fn delete_entry_pair(&self, entry: &AclEntry) -> Result<()> {
        self.delete_entry(&self.ingress_template_id, Direction::Ingress, entry)
            .await?;
        self.delete_entry(&self.egress_template_id, Direction::Egress, entry)
            .await
    }

    async fn delete_entry(
        &self,
        template_id: &str,
        direction: Direction,
        entry: &AclEntry,
    ) -> Result<()> {
        match self.sdn.acl_entry(template_id, direction, entry).await {
            Ok(found) => {
                self.sdn.delete_acl_entry(direction, &found.id).await?;
                Ok(())
            }
            Err(sdn_api::Error::NotFound { .. }) => {
                debug!(%direction, "ACL entry already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn service_added(&mut self, ev: &ServiceEvent) -> Result<()> {
        let group_id = self.target_macro_group(ev).await?;

        let macro_ = NetworkMacro {
            name: format!("NetworkMacro for service: {}/{}", ev.namespace, ev.name),
            ip_type: types::IP_TYPE_V4.to_string(),
            address: ev.cluster_ip.clone(),
            netmask: "255.255.255.255".to_string(),
            ..NetworkMacro::default()
        };
        let macro_id = self
            .sdn
            .create_network_macro(&self.enterprise_id, &macro_)
            .await?;
        if let Some(zone) = self.zones.get_mut(&ev.namespace) {
            zone.macros.insert(ev.name.clone(), macro_id.clone());
        }
        self.sdn.add_macro_to_group(&group_id, &macro_id).await?;
        debug!(namespace = %ev.namespace, service = %ev.name, %macro_id, %group_id, "service macro published");
        Ok(())
    }

    async fn service_deleted(&mut self, ev: &ServiceEvent) -> Result<()> {
        let Some(zone) = self.zones.get(&ev.namespace) else {
            debug!(namespace = %ev.namespace, service = %ev.name, "deleted service in unmanaged namespace");
            return Ok(());
        };
        let Some(macro_id) = zone.macros.get(&ev.name).cloned() else {
            debug!(namespace = %ev.namespace, service = %ev.name, "no macro recorded for deleted service");
            return Ok(());
        };

        self.sdn.delete_network_macro(&macro_id).await?;
        if let Some(zone) = self.zones.get_mut(&ev.namespace) {
            zone.macros.remove(&ev.name);
        }
        Ok(())
    }

    /// Resolves the macro group a service's macro belongs in.
    ///
    /// Annotations take precedence over the namespace's own group, and the
    /// id form wins over the name form. A `zone` annotation is a validation
    /// gate: it must name this service's own, tracked namespace.
    async fn target_macro_group(&self, ev: &ServiceEvent) -> Result<String> {
        if let Some(id) = ev.annotation(ServiceEvent::MACRO_GROUP_ID_ANNOTATION) {
            return Ok(id.to_string());
        }

        if let Some(name) = ev.annotation(ServiceEvent::MACRO_GROUP_NAME_ANNOTATION) {
            return match self
                .sdn
                .network_macro_group_id(&self.enterprise_id, name)
                .await
            {
                Ok(id) => Ok(id),
                Err(error) => {
                    warn!(%error, group = %name, "annotated macro group did not resolve");
                    Err(AnnotationError::UnknownGroup(name.to_string()).into())
                }
            };
        }

        if let Some(zone) = ev.annotation(ServiceEvent::ZONE_ANNOTATION) {
            if !self.zones.contains_key(zone) {
                return Err(AnnotationError::UnknownZone(zone.to_string()).into());
            }
            if zone != ev.namespace {
                return Err(AnnotationError::ZoneMismatch {
                    zone: zone.to_string(),
                    namespace: ev.namespace.clone(),
                }
                .into());
            }
        }

        match self.zones.get(&ev.namespace) {
            Some(zone) if !zone.macro_group_id.is_empty() => Ok(zone.macro_group_id.clone()),
            _ => Err(AnnotationError::UnmanagedNamespace(ev.namespace.clone()).into()),
        }
    }
}

fn zone_group_name(zone: &str) -> String {
    format!("Service Group For Zone - {}", zone)
}

/// Forward rule between every zone and the default zone's service group.
fn default_zone_entry(group_id: &str) -> AclEntry {
    AclEntry {
        action: types::ACTION_FORWARD.to_string(),
        description: "Allow Traffic Between All Zones and Default Zone".to_string(),
        entity_scope: types::ENTITY_SCOPE_ENTERPRISE.to_string(),
        ether_type: types::ETHER_TYPE_IPV4.to_string(),
        location_type: types::LOCATION_ANY.to_string(),
        network_type: types::NETWORK_MACRO_GROUP.to_string(),
        network_id: group_id.to_string(),
        policy_state: types::POLICY_STATE_LIVE.to_string(),
        priority: 1,
        protocol: types::PROTOCOL_ANY.to_string(),
        ..AclEntry::default()
    }
}

/// Forward rule between a zone and its own service group. The priority is
/// assigned by the caller.
fn specific_zone_entry(zone_name: &str, zone_id: &str, group_id: &str) -> AclEntry {
    AclEntry {
        action: types::ACTION_FORWARD.to_string(),
        description: format!("Allow Traffic Between Zone - {} And Its Services", zone_name),
        entity_scope: types::ENTITY_SCOPE_ENTERPRISE.to_string(),
        ether_type: types::ETHER_TYPE_IPV4.to_string(),
        location_type: types::LOCATION_ZONE.to_string(),
        location_id: zone_id.to_string(),
        network_type: types::NETWORK_MACRO_GROUP.to_string(),
        network_id: group_id.to_string(),
        policy_state: types::POLICY_STATE_LIVE.to_string(),
        protocol: types::PROTOCOL_ANY.to_string(),
        ..AclEntry::default()
    }
}
