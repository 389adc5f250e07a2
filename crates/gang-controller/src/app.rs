//! Wires the watchers to the reconciler and drives them until shutdown.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonArgs;
use crate::k8s::store::KubeStore;
use crate::k8s::GroupReconciler;
use crate::k8s::PodWatcher;
use crate::k8s::TemplateWatcher;
use crate::kube_client;

/// Run the controller until a shutdown signal arrives.
pub(crate) async fn run(args: DaemonArgs) -> Result<()> {
    let client = kube_client::init_kube_client(args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

    let reconciler = Arc::new(GroupReconciler::new(
        KubeStore::new(client.clone()),
        args.inherit_owner_annotations,
    ));

    let cancellation_token = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let pod_watcher = PodWatcher::new(
        client.clone(),
        args.namespace.clone(),
        args.scheduler_names.clone(),
        reconciler.clone(),
    );
    let token = cancellation_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = pod_watcher.run(token).await {
            tracing::error!("Pod watcher terminated: {e:?}");
        }
    }));

    let template_watcher = TemplateWatcher::new(client, args.namespace.clone(), reconciler);
    let token = cancellation_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = template_watcher.run(token).await {
            tracing::error!("Template watcher terminated: {e:?}");
        }
    }));

    wait_for_shutdown_signal().await?;

    cancellation_token.cancel();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Controller shutdown completed");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, initiating graceful shutdown");
    }
    Ok(())
}
