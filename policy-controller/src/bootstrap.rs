use anyhow::{Context, Result};
use sdn_policy_controller_sdn_api::{
    types::{self, AclEntry},
    Client, Credentials, Direction, MAX_PRIORITY,
};
use tracing::info;

const ENTERPRISE_NAME: &str = "K8S-Enterprise";
const DOMAIN_TEMPLATE_NAME: &str = "K8S-Domain-Template";
const DOMAIN_NAME: &str = "K8S-Domain";
const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin";
const INGRESS_TEMPLATE_NAME: &str = "Auto-generated Ingress Policies";
const EGRESS_TEMPLATE_NAME: &str = "Auto-generated Egress Policies";

/// Controller-wide SDN state, established once at startup and owned by the
/// reconciler afterwards. Nothing here is persisted; a restarted controller
/// rebuilds it through the same create-or-get sequence.
#[derive(Debug)]
pub struct Bootstrap {
    pub client: Client,
    pub enterprise_id: String,
    pub domain_id: String,
    pub ingress_template_id: String,
    pub egress_template_id: String,
}

/// Runs the one-shot setup sequence. Any failure here is fatal to the
/// process.
pub async fn bootstrap(
    url: &str,
    version: &str,
    creds: Credentials,
    license: Option<&str>,
) -> Result<Bootstrap> {
    let mut client =
        Client::new(url, version, creds).context("failed to build the SDN client")?;
    client
        .authenticate()
        .await
        .context("failed to authenticate with the SDN")?;

    let enterprise_id = client
        .create_enterprise(ENTERPRISE_NAME)
        .await
        .context("failed to create the enterprise")?;
    let admin_id = client
        .create_admin_user(&enterprise_id, ADMIN_USERNAME, ADMIN_PASSWORD)
        .await
        .context("failed to create the admin user")?;
    let group_id = client
        .admin_group_id(&enterprise_id)
        .await
        .context("failed to resolve the admin group")?;
    client
        .add_user_to_group(&group_id, &admin_id)
        .await
        .context("failed to grant the admin role")?;

    match license {
        Some(license) => client
            .install_license(license)
            .await
            .context("failed to install the license")?,
        None => client
            .verify_license()
            .await
            .context("no license configured and none installed")?,
    }

    client
        .login_as_admin(ADMIN_USERNAME, ADMIN_PASSWORD, ENTERPRISE_NAME)
        .await
        .context("failed to log in as the enterprise admin")?;

    let template_id = client
        .create_domain_template(&enterprise_id, DOMAIN_TEMPLATE_NAME)
        .await
        .context("failed to create the domain template")?;
    let domain_id = client
        .create_domain(&enterprise_id, &template_id, DOMAIN_NAME)
        .await
        .context("failed to create the domain")?;

    let ingress_template_id = client
        .create_acl_template(&domain_id, Direction::Ingress, INGRESS_TEMPLATE_NAME)
        .await
        .context("failed to create the ingress ACL template")?;
    let egress_template_id = client
        .create_acl_template(&domain_id, Direction::Egress, EGRESS_TEMPLATE_NAME)
        .await
        .context("failed to create the egress ACL template")?;

    // Re-seeding is idempotent: existing entries resolve through the
    // conflict lookup.
    for entry in baseline_entries() {
        client
            .create_acl_entry(&ingress_template_id, Direction::Ingress, &entry)
            .await
            .context("failed to seed the ingress baseline entries")?;
        client
            .create_acl_entry(&egress_template_id, Direction::Egress, &entry)
            .await
            .context("failed to seed the egress baseline entries")?;
    }

    info!(%enterprise_id, %domain_id, "bootstrap complete");
    Ok(Bootstrap {
        client,
        enterprise_id,
        domain_id,
        ingress_template_id,
        egress_template_id,
    })
}

/// The rules every template starts from: permit intra-zone traffic, and as
/// the last resort drop whatever intra-domain traffic nothing else matched.
fn baseline_entries() -> [AclEntry; 2] {
    let allow = AclEntry {
        action: types::ACTION_FORWARD.to_string(),
        description: "Allow Intra-Zone Traffic".to_string(),
        entity_scope: types::ENTITY_SCOPE_ENTERPRISE.to_string(),
        ether_type: types::ETHER_TYPE_IPV4.to_string(),
        location_type: types::LOCATION_ANY.to_string(),
        network_type: types::NETWORK_ENDPOINT_ZONE.to_string(),
        policy_state: types::POLICY_STATE_LIVE.to_string(),
        priority: 0,
        protocol: types::PROTOCOL_ANY.to_string(),
        ..AclEntry::default()
    };
    let drop = AclEntry {
        action: types::ACTION_DROP.to_string(),
        description: "Drop intra-domain traffic".to_string(),
        network_type: types::NETWORK_ENDPOINT_DOMAIN.to_string(),
        priority: MAX_PRIORITY,
        ..allow.clone()
    };
    [allow, drop]
}
