use futures::prelude::*;
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::{api::Api, runtime::watcher, ResourceExt};
use sdn_policy_controller_core::{EventKind, NamespaceEvent, ServiceEvent};
use tokio::{sync::mpsc, time};
use tracing::{debug, info, warn};

/// Feeds namespace lifecycle events to the reconciler.
///
/// A watch restart replays the full namespace list as `Added` events; the
/// reconciler's create-or-get semantics make the replay converge. Stream
/// errors are logged and the watch polled again after a short pause.
pub(crate) async fn namespaces(client: kube::Client, tx: mpsc::Sender<NamespaceEvent>) {
    let api = Api::<Namespace>::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();
    loop {
        let batch = match events.next().await {
            Some(Ok(watcher::Event::Applied(ns))) => vec![(EventKind::Added, ns)],
            Some(Ok(watcher::Event::Deleted(ns))) => vec![(EventKind::Deleted, ns)],
            Some(Ok(watcher::Event::Restarted(list))) => {
                info!(count = list.len(), "namespace watch restarted");
                list.into_iter().map(|ns| (EventKind::Added, ns)).collect()
            }
            Some(Err(error)) => {
                warn!(%error, "namespace watch disconnected");
                time::sleep(time::Duration::from_secs(1)).await;
                continue;
            }
            None => return,
        };
        for (kind, ns) in batch {
            let ev = NamespaceEvent {
                kind,
                name: ns.name_any(),
            };
            if tx.send(ev).await.is_err() {
                return;
            }
        }
    }
}

/// Feeds service lifecycle events to the reconciler. Services without a
/// cluster IP (headless services) never get a network macro and are skipped.
pub(crate) async fn services(client: kube::Client, tx: mpsc::Sender<ServiceEvent>) {
    let api = Api::<Service>::all(client);
    let mut events = watcher::watcher(api, watcher::Config::default()).boxed();
    loop {
        let batch = match events.next().await {
            Some(Ok(watcher::Event::Applied(svc))) => vec![(EventKind::Added, svc)],
            Some(Ok(watcher::Event::Deleted(svc))) => vec![(EventKind::Deleted, svc)],
            Some(Ok(watcher::Event::Restarted(list))) => {
                info!(count = list.len(), "service watch restarted");
                list.into_iter().map(|svc| (EventKind::Added, svc)).collect()
            }
            Some(Err(error)) => {
                warn!(%error, "service watch disconnected");
                time::sleep(time::Duration::from_secs(1)).await;
                continue;
            }
            None => return,
        };
        for (kind, svc) in batch {
            let Some(ev) = service_event(kind, &svc) else {
                debug!(service = %svc.name_any(), "skipping service without a cluster IP");
                continue;
            };
            if tx.send(ev).await.is_err() {
                return;
            }
        }
    }
}

fn service_event(kind: EventKind, svc: &Service) -> Option<ServiceEvent> {
    let namespace = svc.namespace()?;
    let cluster_ip = svc
        .spec
        .as_ref()
        .and_then(|s| s.cluster_ip.clone())
        .filter(|ip| !ip.is_empty() && ip != "None")?;
    let annotations = svc
        .annotations()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(ServiceEvent {
        kind,
        namespace,
        name: svc.name_any(),
        cluster_ip,
        annotations,
    })
}
