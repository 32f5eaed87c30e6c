//! An SDN policy controller.
//!
//! The controller keeps a software-defined-network management plane in sync
//! with the cluster: one zone per namespace with a subnet carved from the
//! cluster CIDR, default-allow and cross-zone ACL entries, and one network
//! macro per service, grouped per zone so ACLs can reference a namespace's
//! services collectively.
//!
//! A one-shot bootstrap establishes the enterprise, domain and ACL
//! templates. After that a single reconciliation task consumes namespace and
//! service events from the cluster watchers and applies idempotent
//! operations to the SDN, so event replays (including full watch restarts)
//! converge instead of duplicating state.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod bootstrap;
mod reconciler;
mod watch;

pub use self::{
    bootstrap::{bootstrap, Bootstrap},
    reconciler::{AnnotationError, Reconciler},
};

use anyhow::{Context, Result};
use clap::Parser;
use sdn_policy_controller_core::{Ipv4Subnet, SubnetPool};
use sdn_policy_controller_sdn_api::Credentials;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "sdn-policy-controller",
    about = "Keeps the SDN in sync with cluster namespaces and services"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "sdn_policy_controller=info,warn",
        env = "SDN_POLICY_CONTROLLER_LOG"
    )]
    log_level: String,

    /// Base URL of the SDN management API.
    #[clap(long, env = "SDN_URL")]
    sdn_url: String,

    /// API version path segment, e.g. `v6`.
    #[clap(long, default_value = "v6")]
    sdn_version: String,

    /// Cluster-wide CIDR from which zone subnets are carved.
    #[clap(long, default_value = "10.128.0.0/14")]
    cluster_cidr: Ipv4Subnet,

    /// Size in bits of the host part of each zone subnet; 8 yields /24s.
    #[clap(long, default_value = "8")]
    subnet_length: u8,

    /// License file to install during bootstrap. When unset, a license must
    /// already be present on the SDN.
    #[clap(long)]
    license_file: Option<std::path::PathBuf>,

    #[clap(long, default_value = "csproot", env = "SDN_CSP_USERNAME")]
    csp_username: String,

    #[clap(long, default_value = "csproot", env = "SDN_CSP_PASSWORD")]
    csp_password: String,

    #[clap(long, default_value = "csp")]
    csp_organization: String,
}

// === impl Args ===

impl Args {
    pub async fn run(self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .context("invalid log level")?;
        tracing_subscriber::fmt().with_env_filter(filter).init();

        let subnet_length = self.subnet_length();
        let subnet_prefix = 32 - subnet_length;

        let mut pool = SubnetPool::default();
        pool.free(self.cluster_cidr)
            .context("failed to seed the subnet pool")?;

        let license = match &self.license_file {
            Some(path) => Some(std::fs::read_to_string(path).with_context(|| {
                format!("failed to read license file {}", path.display())
            })?),
            None => None,
        };

        let creds = Credentials {
            username: self.csp_username.clone(),
            password: self.csp_password.clone(),
            organization: self.csp_organization.clone(),
        };
        let boot = bootstrap::bootstrap(
            &self.sdn_url,
            &self.sdn_version,
            creds,
            license.as_deref().map(str::trim),
        )
        .await
        .context("bootstrap failed")?;

        let client = kube::Client::try_default()
            .await
            .context("failed to connect to the cluster")?;
        let (ns_tx, ns_rx) = mpsc::channel(128);
        let (svc_tx, svc_rx) = mpsc::channel(128);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        tokio::spawn(watch::namespaces(client.clone(), ns_tx).instrument(info_span!("namespaces")));
        tokio::spawn(watch::services(client, svc_tx).instrument(info_span!("services")));
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to register the interrupt handler");
            }
            let _ = stop_tx.send(()).await;
        });

        info!(cidr = %self.cluster_cidr, subnet_length, "starting reconciler");
        Reconciler::new(boot, pool, subnet_prefix)
            .run(ns_rx, svc_rx, stop_rx)
            .await;
        Ok(())
    }

    /// Clamps the configured subnet length to what the cluster CIDR can
    /// hold: at most 32 bits, and no larger than the CIDR's host part —
    /// otherwise half the host bits are used, rounded down.
    fn subnet_length(&self) -> u8 {
        let available = 32 - self.cluster_cidr.prefix();
        let mut length = self.subnet_length.min(32);
        if length > available {
            let fallback = available / 2;
            warn!(
                requested = length,
                cidr = %self.cluster_cidr,
                "cannot carve {}-bit subnets; using {} bits",
                length,
                fallback,
            );
            length = fallback;
        }
        length
    }
}
