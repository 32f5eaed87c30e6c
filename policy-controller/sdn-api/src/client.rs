use crate::{
    session::{Credentials, Reply, Session},
    types::{
        AclEntry, AclTemplate, Domain, Group, License, NetworkMacro, Object, Subnet, User,
        IP_TYPE_V4, PAT_ENABLED, PAT_INHERITED,
    },
    Error,
};
use reqwest::StatusCode;
use sdn_policy_controller_core::Ipv4Subnet;
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

/// Selects the ingress or egress side of a domain's ACL configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

/// Typed, idempotent operations over the SDN's conflict-returning REST API.
///
/// Every create follows the create-or-get pattern: POST the payload, and on a
/// conflict resolve the existing object through a filtered GET on its natural
/// key. A filtered GET that matches nothing is `NotFound`; one that matches a
/// record with a different natural key is `Mismatch` — never silently
/// accepted. Deletes send the SDN's confirm flag and are never retried.
#[derive(Debug)]
pub struct Client {
    session: Session,
}

// === impl Direction ===

impl Direction {
    fn template_collection(self) -> &'static str {
        match self {
            Self::Ingress => "ingressacltemplates",
            Self::Egress => "egressacltemplates",
        }
    }

    fn entry_collection(self) -> &'static str {
        match self {
            Self::Ingress => "ingressaclentrytemplates",
            Self::Egress => "egressaclentrytemplates",
        }
    }

    fn template_entity(self) -> &'static str {
        match self {
            Self::Ingress => "ingress ACL template",
            Self::Egress => "egress ACL template",
        }
    }

    fn entry_entity(self) -> &'static str {
        match self {
            Self::Ingress => "ingress ACL entry",
            Self::Egress => "egress ACL entry",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "ingress".fmt(f),
            Self::Egress => "egress".fmt(f),
        }
    }
}

// === impl Client ===

impl Client {
    pub fn new(url: &str, version: &str, creds: Credentials) -> Result<Self, Error> {
        Ok(Self {
            session: Session::new(url, version, creds)?,
        })
    }

    /// Exchanges the configured password for an API key.
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        self.session.authenticate().await
    }

    /// Drops the bootstrap identity and re-authenticates as an enterprise
    /// admin.
    pub async fn login_as_admin(
        &mut self,
        username: &str,
        password: &str,
        organization: &str,
    ) -> Result<(), Error> {
        self.session.login(username, password, organization).await
    }

    pub async fn create_enterprise(&self, name: &str) -> Result<String, Error> {
        let payload = Object {
            name: name.to_string(),
            description: "Auto-generated enterprise for the managed cluster".to_string(),
            ..Object::default()
        };
        let reply = self.session.post::<_, Object>("enterprises", &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "enterprise", |o| o.id),
            StatusCode::CONFLICT => self.enterprise_id(name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn enterprise_id(&self, name: &str) -> Result<String, Error> {
        let reply = self
            .session
            .get::<Object>("enterprises", Some(&name_filter(name)))
            .await?;
        named_id(reply, name, "enterprise")
    }

    /// Creates the enterprise admin, or resolves it by user name. The SDN
    /// stores only a SHA-1 digest of the password.
    pub async fn create_admin_user(
        &self,
        enterprise_id: &str,
        username: &str,
        password: &str,
    ) -> Result<String, Error> {
        let payload = User {
            user_name: username.to_string(),
            password: hex::encode(Sha1::digest(password.as_bytes())),
            first_name: "Admin".to_string(),
            last_name: "Admin".to_string(),
            email: "admin@localhost".to_string(),
            ..User::default()
        };
        let path = format!("enterprises/{}/users", enterprise_id);
        let reply = self.session.post::<_, User>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "admin user", |u| u.id),
            StatusCode::CONFLICT => self.admin_user_id(enterprise_id, username).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn admin_user_id(&self, enterprise_id: &str, username: &str) -> Result<String, Error> {
        let path = format!("enterprises/{}/users", enterprise_id);
        let filter = format!(r#"userName == "{}""#, username);
        let reply = self.session.get::<User>(&path, Some(&filter)).await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        match reply.first() {
            Some(u) if u.user_name == username => Ok(u.id),
            Some(u) if !u.user_name.is_empty() => Err(Error::Mismatch {
                entity: "admin user",
                expected: username.to_string(),
                found: u.user_name,
            }),
            _ => Err(Error::NotFound {
                entity: "admin user",
            }),
        }
    }

    /// The enterprise's built-in admin group, identified by its role tag.
    pub async fn admin_group_id(&self, enterprise_id: &str) -> Result<String, Error> {
        const ROLE: &str = "ORGADMIN";
        let path = format!("enterprises/{}/groups", enterprise_id);
        let filter = format!(r#"role == "{}""#, ROLE);
        let reply = self.session.get::<Group>(&path, Some(&filter)).await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        match reply.first() {
            Some(g) if g.role == ROLE => Ok(g.id),
            Some(g) if !g.id.is_empty() => Err(Error::Mismatch {
                entity: "admin group",
                expected: ROLE.to_string(),
                found: g.role,
            }),
            _ => Err(Error::NotFound {
                entity: "admin group",
            }),
        }
    }

    /// Adds a user to a group; an existing membership is success.
    pub async fn add_user_to_group(&self, group_id: &str, user_id: &str) -> Result<(), Error> {
        let path = format!("groups/{}/users", group_id);
        let members = vec![user_id.to_string()];
        let reply = self.session.put(&path, &members).await?;
        match reply.status {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::CONFLICT => {
                debug!(%user_id, %group_id, "user already a group member");
                Ok(())
            }
            _ => Err(reply.unexpected()),
        }
    }

    /// Installs a license; a previously installed license is success.
    pub async fn install_license(&self, license: &str) -> Result<(), Error> {
        let payload = License {
            license: license.to_string(),
            ..License::default()
        };
        let reply = self.session.post::<_, License>("licenses", &payload).await?;
        match reply.status {
            StatusCode::CREATED => {
                debug!("installed license");
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("license already installed");
                Ok(())
            }
            _ => Err(reply.unexpected()),
        }
    }

    /// Confirms that some license is already installed.
    pub async fn verify_license(&self) -> Result<(), Error> {
        let reply = self.session.get::<License>("licenses", None).await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        Ok(())
    }

    pub async fn create_domain_template(
        &self,
        enterprise_id: &str,
        name: &str,
    ) -> Result<String, Error> {
        let payload = Object {
            name: name.to_string(),
            description: "Auto-generated default domain template".to_string(),
            ..Object::default()
        };
        let path = format!("enterprises/{}/domaintemplates", enterprise_id);
        let reply = self.session.post::<_, Object>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "domain template", |o| o.id),
            StatusCode::CONFLICT => self.domain_template_id(enterprise_id, name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn domain_template_id(
        &self,
        enterprise_id: &str,
        name: &str,
    ) -> Result<String, Error> {
        let path = format!("enterprises/{}/domaintemplates", enterprise_id);
        let reply = self.session.get::<Object>(&path, Some(&name_filter(name))).await?;
        named_id(reply, name, "domain template")
    }

    pub async fn create_domain(
        &self,
        enterprise_id: &str,
        template_id: &str,
        name: &str,
    ) -> Result<String, Error> {
        let payload = Domain {
            name: name.to_string(),
            description: "Auto-generated domain for cluster workloads".to_string(),
            template_id: template_id.to_string(),
            pat_enabled: PAT_ENABLED.to_string(),
            ..Domain::default()
        };
        let path = format!("enterprises/{}/domains", enterprise_id);
        let reply = self.session.post::<_, Domain>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "domain", |d| d.id),
            StatusCode::CONFLICT => self.domain_id(enterprise_id, name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn domain_id(&self, enterprise_id: &str, name: &str) -> Result<String, Error> {
        let path = format!("enterprises/{}/domains", enterprise_id);
        let reply = self.session.get::<Object>(&path, Some(&name_filter(name))).await?;
        named_id(reply, name, "domain")
    }

    pub async fn delete_domain(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("domains/{}", id)).await
    }

    pub async fn create_acl_template(
        &self,
        domain_id: &str,
        direction: Direction,
        name: &str,
    ) -> Result<String, Error> {
        let payload = AclTemplate {
            name: name.to_string(),
            default_allow_ip: true,
            default_allow_non_ip: true,
            ..AclTemplate::default()
        };
        let path = format!("domains/{}/{}", domain_id, direction.template_collection());
        let reply = self.session.post::<_, AclTemplate>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, direction.template_entity(), |t| t.id),
            StatusCode::CONFLICT => self.acl_template_id(domain_id, direction, name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn acl_template_id(
        &self,
        domain_id: &str,
        direction: Direction,
        name: &str,
    ) -> Result<String, Error> {
        let path = format!("domains/{}/{}", domain_id, direction.template_collection());
        let reply = self
            .session
            .get::<AclTemplate>(&path, Some(&name_filter(name)))
            .await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        let entity = direction.template_entity();
        match reply.first() {
            Some(t) if t.name == name => Ok(t.id),
            Some(t) if !t.name.is_empty() => Err(Error::Mismatch {
                entity,
                expected: name.to_string(),
                found: t.name,
            }),
            _ => Err(Error::NotFound { entity }),
        }
    }

    /// Creates an ACL entry under a template, or resolves the existing entry
    /// matching the same semantic fields.
    pub async fn create_acl_entry(
        &self,
        template_id: &str,
        direction: Direction,
        entry: &AclEntry,
    ) -> Result<String, Error> {
        let path = format!(
            "{}/{}/{}",
            direction.template_collection(),
            template_id,
            direction.entry_collection()
        );
        let reply = self.session.post::<_, AclEntry>(&path, entry).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, direction.entry_entity(), |e| e.id),
            StatusCode::CONFLICT => {
                let existing = self.acl_entry(template_id, direction, entry).await?;
                Ok(existing.id)
            }
            _ => Err(reply.unexpected()),
        }
    }

    /// Resolves the entry matching `entry`'s semantic fields under a template.
    pub async fn acl_entry(
        &self,
        template_id: &str,
        direction: Direction,
        entry: &AclEntry,
    ) -> Result<AclEntry, Error> {
        let path = format!(
            "{}/{}/{}",
            direction.template_collection(),
            template_id,
            direction.entry_collection()
        );
        let reply = self
            .session
            .get::<AclEntry>(&path, Some(&entry.filter()))
            .await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        let entity = direction.entry_entity();
        match reply.first() {
            Some(found) if entry.matches(&found) => Ok(found),
            Some(found) if !found.id.is_empty() => Err(Error::Mismatch {
                entity,
                expected: entry.filter(),
                found: found.filter(),
            }),
            _ => Err(Error::NotFound { entity }),
        }
    }

    pub async fn delete_acl_entry(&self, direction: Direction, id: &str) -> Result<(), Error> {
        self.delete(&format!("{}/{}", direction.entry_collection(), id))
            .await
    }

    pub async fn create_zone(&self, domain_id: &str, name: &str) -> Result<String, Error> {
        let payload = Object {
            name: name.to_string(),
            description: format!("Auto-generated for namespace \"{}\"", name),
            ..Object::default()
        };
        let path = format!("domains/{}/zones", domain_id);
        let reply = self.session.post::<_, Object>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "zone", |o| o.id),
            StatusCode::CONFLICT => self.zone_id(domain_id, name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn zone_id(&self, domain_id: &str, name: &str) -> Result<String, Error> {
        let path = format!("domains/{}/zones", domain_id);
        let reply = self.session.get::<Object>(&path, Some(&name_filter(name))).await?;
        named_id(reply, name, "zone")
    }

    pub async fn delete_zone(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("zones/{}", id)).await
    }

    pub async fn create_subnet(
        &self,
        name: &str,
        zone_id: &str,
        subnet: &Ipv4Subnet,
    ) -> Result<String, Error> {
        let payload = Subnet {
            name: name.to_string(),
            ip_type: IP_TYPE_V4.to_string(),
            address: subnet.address().to_string(),
            netmask: subnet.netmask().to_string(),
            description: "Auto-generated subnet".to_string(),
            pat_enabled: PAT_INHERITED.to_string(),
            ..Subnet::default()
        };
        let path = format!("zones/{}/subnets", zone_id);
        let reply = self.session.post::<_, Subnet>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "subnet", |s| s.id),
            StatusCode::CONFLICT => self.subnet_id(zone_id, subnet).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn subnet_id(&self, zone_id: &str, subnet: &Ipv4Subnet) -> Result<String, Error> {
        let address = subnet.address().to_string();
        let path = format!("zones/{}/subnets", zone_id);
        let filter = format!(r#"address == "{}""#, address);
        let reply = self.session.get::<Subnet>(&path, Some(&filter)).await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        match reply.first() {
            Some(s) if s.address == address => Ok(s.id),
            Some(s) if !s.address.is_empty() => Err(Error::Mismatch {
                entity: "subnet",
                expected: address,
                found: s.address,
            }),
            _ => Err(Error::NotFound { entity: "subnet" }),
        }
    }

    pub async fn delete_subnet(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("subnets/{}", id)).await
    }

    pub async fn create_network_macro_group(
        &self,
        enterprise_id: &str,
        name: &str,
    ) -> Result<String, Error> {
        let payload = Object {
            name: name.to_string(),
            description: "Auto-generated network macro group".to_string(),
            ..Object::default()
        };
        let path = format!("enterprises/{}/networkmacrogroups", enterprise_id);
        let reply = self.session.post::<_, Object>(&path, &payload).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "network macro group", |o| o.id),
            StatusCode::CONFLICT => self.network_macro_group_id(enterprise_id, name).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn network_macro_group_id(
        &self,
        enterprise_id: &str,
        name: &str,
    ) -> Result<String, Error> {
        let path = format!("enterprises/{}/networkmacrogroups", enterprise_id);
        let reply = self.session.get::<Object>(&path, Some(&name_filter(name))).await?;
        named_id(reply, name, "network macro group")
    }

    pub async fn delete_network_macro_group(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("networkmacrogroups/{}", id)).await
    }

    pub async fn create_network_macro(
        &self,
        enterprise_id: &str,
        macro_: &NetworkMacro,
    ) -> Result<String, Error> {
        let path = format!("enterprises/{}/enterprisenetworks", enterprise_id);
        let reply = self.session.post::<_, NetworkMacro>(&path, macro_).await?;
        match reply.status {
            StatusCode::CREATED => created(reply, "network macro", |m| m.id),
            StatusCode::CONFLICT => self.network_macro_id(enterprise_id, macro_).await,
            _ => Err(reply.unexpected()),
        }
    }

    pub async fn network_macro_id(
        &self,
        enterprise_id: &str,
        macro_: &NetworkMacro,
    ) -> Result<String, Error> {
        let path = format!("enterprises/{}/networkmacros", enterprise_id);
        let reply = self
            .session
            .get::<NetworkMacro>(&path, Some(&macro_.filter()))
            .await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        match reply.first() {
            Some(found) if macro_.matches(&found) => Ok(found.id),
            Some(found) if !found.name.is_empty() => Err(Error::Mismatch {
                entity: "network macro",
                expected: macro_.name.clone(),
                found: found.name,
            }),
            _ => Err(Error::NotFound {
                entity: "network macro",
            }),
        }
    }

    pub async fn delete_network_macro(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("enterprisenetworks/{}", id)).await
    }

    /// Adds a macro to a group's member list; an existing membership is
    /// success.
    pub async fn add_macro_to_group(&self, group_id: &str, macro_id: &str) -> Result<(), Error> {
        let path = format!("networkmacrogroups/{}/enterprisenetworks", group_id);
        let members = vec![macro_id.to_string()];
        let reply = self.session.put(&path, &members).await?;
        match reply.status {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::CONFLICT => {
                debug!(%macro_id, %group_id, "macro already a group member");
                Ok(())
            }
            _ => Err(reply.unexpected()),
        }
    }

    /// Deletes with the SDN's confirm flag; only `204 No Content` is success.
    async fn delete(&self, path: &str) -> Result<(), Error> {
        let reply = self
            .session
            .delete(&format!("{}?responseChoice=1", path))
            .await?;
        match reply.status {
            StatusCode::NO_CONTENT => Ok(()),
            _ => Err(reply.unexpected()),
        }
    }
}

fn name_filter(name: &str) -> String {
    format!(r#"name == "{}""#, name)
}

/// Extracts the identifier from a creation reply.
fn created<T>(
    reply: Reply<T>,
    entity: &'static str,
    id: impl FnOnce(T) -> String,
) -> Result<String, Error> {
    let status = reply.status;
    let id = reply.first().map(id).unwrap_or_default();
    if id.is_empty() {
        return Err(Error::UnexpectedStatus {
            status,
            message: format!("created {} but the reply carried no identifier", entity),
        });
    }
    debug!(%id, "created {}", entity);
    Ok(id)
}

/// Resolves a name-keyed lookup reply, verifying the natural key.
fn named_id(reply: Reply<Object>, name: &str, entity: &'static str) -> Result<String, Error> {
    if reply.status != StatusCode::OK {
        return Err(reply.unexpected());
    }
    match reply.first() {
        Some(o) if o.name == name => Ok(o.id),
        Some(o) if !o.name.is_empty() => Err(Error::Mismatch {
            entity,
            expected: name.to_string(),
            found: o.name,
        }),
        _ => Err(Error::NotFound { entity }),
    }
}
