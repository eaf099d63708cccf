//! Park process wiring.
//!
//! Startup order: singleton check, snapshot load, journal open. Then the
//! HTTP API and the reconciler run side by side until shutdown, after which
//! the snapshot is saved one last time.

use crate::{
    cluster::ClusterClient,
    config::{GuestConfig, ParkConfig},
    discovery::{ClusterPeers, Discovery, PeerSource, StaticPeers, PARK_STATUS_PATH},
    economy::Economy,
    error::ParkResult,
    guest::Guest,
    ledger::Ledger,
    orchestrator::{GuestLauncher, InProcessOrchestrator, KubeJobOrchestrator, WorkloadOrchestrator},
    park_api,
    reconcile::Reconciler,
    snapshot::{SnapshotFile, PARK_SNAPSHOT_FILE},
    store::ParkStore,
};
use chrono::Utc;
use futures::FutureExt;
use std::{future::Future, sync::Arc};
use tokio::{net::TcpListener, sync::watch};

pub struct Park {
    config:       ParkConfig,
    economy:      Arc<Economy>,
    discovery:    Arc<Discovery>,
    orchestrator: Arc<dyn WorkloadOrchestrator>,
}

impl Park {
    /// Pick peer source and orchestrator from the environment, then start.
    ///
    /// Static peers when configured, else the in-cluster pod list. Guests
    /// are Kubernetes jobs when an image is set, else in-process tasks.
    pub async fn from_config(config: ParkConfig) -> ParkResult<Self> {
        config.validate()?;
        let cluster = match ClusterClient::in_cluster() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                log::info!("Not running in a cluster ({e})");
                None
            }
        };

        let peers: Arc<dyn PeerSource> = match (&cluster, config.peers.is_empty()) {
            (_, false) => Arc::new(StaticPeers::new(config.peers.clone())),
            (Some(client), true) => Arc::new(ClusterPeers::new(
                Arc::clone(client),
                std::env::var("HOSTNAME").ok(),
                config.peer_port,
            )),
            (None, true) => {
                log::warn!("No peers configured and no cluster; discovery will find nothing");
                Arc::new(StaticPeers::new(Vec::new()))
            }
        };

        let orchestrator: Arc<dyn WorkloadOrchestrator> = match (&cluster, config.image.is_empty()) {
            (Some(client), false) => Arc::new(
                KubeJobOrchestrator::new(Arc::clone(client), config.image.clone())
                    .with_namespace(config.namespace.clone()),
            ),
            (None, false) => {
                return Err(crate::error::ParkError::Config(
                    "a guest image needs the in-cluster API".into(),
                ));
            }
            (_, true) => Arc::new(InProcessOrchestrator::new(local_guests(GuestConfig::default()))),
        };

        Self::start(config, peers, orchestrator).await
    }

    /// Refuse to start next to another park, then load state.
    pub async fn start(
        config: ParkConfig,
        peers: Arc<dyn PeerSource>,
        orchestrator: Arc<dyn WorkloadOrchestrator>,
    ) -> ParkResult<Self> {
        config.validate()?;
        let discovery = Arc::new(Discovery::new(peers, config.discovery())?);
        discovery.ensure_singleton(PARK_STATUS_PATH).await?;

        let volume = config.volume.as_deref();
        let snapshot = SnapshotFile::new(volume, PARK_SNAPSHOT_FILE);
        let ledger = Ledger::load(snapshot, || config.initial_state(Utc::now()))?;
        ledger.mutate(|s| {
            config.apply_operator_settings(s);
            Ok(())
        })?;
        if !ledger.is_persistent() {
            log::warn!("No volume configured, park state will not survive a restart");
        }
        let journal = ParkStore::for_volume(volume)?;

        let economy = Economy::new(Arc::new(ledger), Arc::new(journal))
            .with_guest_space_tracking(config.track_guest_space);
        Ok(Self {
            config,
            economy: Arc::new(economy),
            discovery,
            orchestrator,
        })
    }

    pub fn economy(&self) -> &Arc<Economy> {
        &self.economy
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            Arc::clone(&self.economy),
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.discovery),
            self.config.reconcile(),
        )
    }

    /// Serve the API and run the reconciler until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ParkResult<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let reconciler = tokio::spawn(self.reconciler().run(stop_rx));

        log::info!("Park listening on {}", listener.local_addr()?);
        axum::serve(listener, park_api::router(Arc::clone(&self.economy)))
            .with_graceful_shutdown(shutdown)
            .await?;

        let _ = stop_tx.send(true);
        if let Err(e) = reconciler.await {
            log::warn!("Reconciler task ended abnormally: {e}");
        }
        match self.orchestrator.cleanup_all().await {
            Ok(0) => {}
            Ok(n) => log::info!("Cleaned up {n} guests on shutdown"),
            Err(e) => log::warn!("Guest cleanup on shutdown failed: {e}"),
        }
        self.economy.ledger().save()?;
        log::info!("Park state saved, bye");
        Ok(())
    }
}

/// Launch guests as tasks in this process, each visiting `park_url`.
pub fn local_guests(template: GuestConfig) -> GuestLauncher {
    Arc::new(move |park_url: String| {
        let config = GuestConfig { park_url, ..template.clone() };
        async move {
            match Guest::new(config) {
                Ok(guest) => {
                    if let Err(e) = guest.run().await {
                        log::warn!("Local guest failed: {e}");
                    }
                }
                Err(e) => log::warn!("Could not create local guest: {e}"),
            }
        }
        .boxed()
    })
}
