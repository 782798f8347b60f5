use std::sync::Arc;

use futures::future::{self, Either};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;

use self::{
    proxy::{Proxy, ProxyEvent},
    scheduler::{Scheduler, TokioScheduler},
    sharding::{
        communication::TRANSFER_REQUEST_CHANNEL,
        subscriber::{Backoff, Subscription},
        Bus, RedisBus,
    },
    transfer::TransferCoordinator,
};

pub mod error;
pub mod proxy;
pub mod redis_pool;
pub mod scheduler;
pub mod sharding;
pub mod transfer;

/*
    # Flow chart of the seamless transfer service

    main() ────────────────► service.run(...) ──┐
                                                │
    ┌───────── request on redis channel ◄───────┘
    │
    └────► middleware ────► coordinator ────► publish pre-load
                                  │
                                  └────► schedule handoff ────► proxy switches server

    proxy events (pre-connect / disconnect) ────► coordinator bookkeeping
*/

pub struct Service {
    redis_client: redis::Client,
    backoff: Backoff,

    coordinator: Arc<TransferCoordinator>,
    subscription: Option<Subscription>,
}

impl Service {
    /// Connects to redis and builds the coordinator on the current tokio runtime
    pub fn new(cfg: &Config, proxy: Arc<dyn Proxy>) -> Result<Service, Box<dyn std::error::Error>> {
        let redis_pool = redis_pool::connect(cfg.connection_info())?;
        let redis_client = redis::Client::open(cfg.connection_info())?;

        let bus: Arc<dyn Bus> = Arc::new(RedisBus::new(redis_pool));
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
        let coordinator = TransferCoordinator::new(proxy, bus, scheduler, cfg.preload_delay());

        info!(
            "Connected to redis at {}:{}",
            cfg.redis_host, cfg.redis_port
        );

        Ok(Service {
            redis_client,
            backoff: cfg.backoff(),
            coordinator,
            subscription: None,
        })
    }

    pub fn coordinator(&self) -> &Arc<TransferCoordinator> {
        &self.coordinator
    }

    /// Starts listening for transfer requests, every payload goes through `middleware`
    pub fn subscribe(
        &mut self,
        middleware: fn(&Arc<TransferCoordinator>, String),
    ) -> std::io::Result<()> {
        let coordinator = self.coordinator.clone();
        let subscription = Subscription::start(
            self.redis_client.clone(),
            TRANSFER_REQUEST_CHANNEL,
            self.backoff.clone(),
            move |payload| middleware(&coordinator, payload),
        )?;
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Runs until ctrl-c or until the proxy stops sending events
    pub async fn run(
        &mut self,
        events: UnboundedReceiver<ProxyEvent>,
        middleware: fn(&Arc<TransferCoordinator>, String),
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.subscribe(middleware)?;

        let dispatcher = tokio::spawn(dispatch_events(self.coordinator.clone(), events));
        let ctrl_c = tokio::signal::ctrl_c();
        futures::pin_mut!(ctrl_c);

        match future::select(ctrl_c, dispatcher).await {
            Either::Left((signal, dispatcher)) => {
                signal?;
                info!("Received shutdown signal");
                dispatcher.abort();
            }
            Either::Right(_) => {
                warn!("Proxy event stream closed");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Closes the subscription and drops every pending transfer
    pub async fn shutdown(&mut self) {
        info!("Shutting down...");

        if let Some(subscription) = self.subscription.take() {
            subscription.shutdown().await;
            info!("Redis subscription closed");
        }
        self.coordinator.shutdown();

        info!("Shutdown complete");
    }
}

/// Forwards proxy connection events to the coordinator until the proxy goes away
pub async fn dispatch_events(
    coordinator: Arc<TransferCoordinator>,
    mut events: UnboundedReceiver<ProxyEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProxyEvent::ServerPreConnect { player_id, server } => {
                coordinator.on_arrival(&player_id, &server);
            }
            ProxyEvent::Disconnect { player_id } => {
                coordinator.on_player_disconnect(&player_id);
            }
        }
    }
}
