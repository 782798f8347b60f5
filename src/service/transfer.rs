use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use uuid::Uuid;

use super::{
    error::TransferError,
    proxy::{PlayerHandle, Proxy, ShardHandle},
    scheduler::Scheduler,
    sharding::{
        communication::{
            preload::PreloadCommand, request::TransferRequest, Position, PRELOAD_CHANNEL,
        },
        Bus,
    },
};

/*
    # Lifecycle of a single transfer

    request ──► parse ──► player + shard lookup ──► pending table (insert / replace)
                                                        │
                         publish pre-load command ◄─────┘
                                   │
                                   └──► schedule handoff (preload delay)
                                                        │
    ┌─────────── handoff fires ◄────────────────────────┘
    │
    ├── player gone ─────────────────► interrupted
    ├── newer generation pending ────► superseded
    └── otherwise ───────────────────► switch backend connection
*/

/// The single in-flight transfer of one player
#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub(crate) shard: String,
    pub(crate) position: Position,
    pub(crate) generation: u64,
    pub(crate) created_at: Instant,
}

impl PendingTransfer {
    #[inline]
    pub fn shard(&self) -> &str {
        &self.shard
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time since the request was accepted
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Everything a scheduled handoff captured when it was armed
#[derive(Debug, Clone)]
pub struct Handoff {
    pub(crate) player: PlayerHandle,
    pub(crate) shard: ShardHandle,
    pub(crate) position: Position,
    pub(crate) generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The backend connection switch was issued
    Executed,

    /// A newer request for the same player replaced this one
    Superseded,
}

/// Tracks in-flight transfers and drives them from request to handoff.
///
/// Every method can be called concurrently from the bus listener, the
/// scheduler and the proxy's event dispatch. The pending table is only ever
/// touched one player key at a time.
pub struct TransferCoordinator {
    proxy: Arc<dyn Proxy>,
    bus: Arc<dyn Bus>,
    scheduler: Arc<dyn Scheduler>,
    preload_delay: Duration,

    pending: DashMap<Uuid, PendingTransfer>,
    generation: AtomicU64,
    closed: AtomicBool,

    this: Weak<TransferCoordinator>,
}

impl TransferCoordinator {
    pub fn new(
        proxy: Arc<dyn Proxy>,
        bus: Arc<dyn Bus>,
        scheduler: Arc<dyn Scheduler>,
        preload_delay: Duration,
    ) -> Arc<TransferCoordinator> {
        Arc::new_cyclic(|this| TransferCoordinator {
            proxy,
            bus,
            scheduler,
            preload_delay,
            pending: DashMap::new(),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// Handles one raw payload from the transfer request channel.
    ///
    /// On success the player's pending transfer is (re)armed, the pre-load
    /// command is published and the handoff is scheduled. Returns the id of
    /// the player being transferred.
    pub fn on_transfer_request(&self, raw: &str) -> Result<Uuid, TransferError> {
        if self.is_shutdown() {
            return Err(TransferError::ShuttingDown);
        }

        let request = TransferRequest::parse(raw)?;

        let player = self
            .proxy
            .player(request.player_id())
            .ok_or(TransferError::UnknownPlayer(request.player_id))?;
        let shard = self
            .proxy
            .server(request.shard())
            .ok_or_else(|| TransferError::UnknownShard(request.shard.clone()))?;

        info!(
            "Processing transfer: {} -> {} at {}",
            player.username,
            shard.name,
            request.position()
        );

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.pending.insert(
            player.id,
            PendingTransfer {
                shard: shard.name.clone(),
                position: request.position(),
                generation,
                created_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Transfer of {} to {} replaced by a newer request to {}",
                player.username, previous.shard, shard.name
            );
        }

        // A shutdown that raced this request may already have drained the table
        if self.is_shutdown() {
            self.pending
                .remove_if(&player.id, |_, p| p.generation == generation);
            return Err(TransferError::ShuttingDown);
        }

        // Pre-load chunks on the destination shard
        let preload = PreloadCommand::from(&request).to_string();
        match self.bus.publish(PRELOAD_CHANNEL, &preload) {
            Ok(_) => debug!("Sent chunk pre-load request: {}", preload),
            Err(e) => {
                // The handoff still happens, only without the pre-load
                error!(
                    "Could not publish chunk pre-load for {}: {}",
                    player.username,
                    TransferError::from(e)
                );
            }
        }

        let handoff = Handoff {
            player,
            shard,
            position: request.position(),
            generation,
        };
        let coordinator = self.this.clone();
        self.scheduler.schedule(
            self.preload_delay,
            Box::new(move || {
                if let Some(coordinator) = coordinator.upgrade() {
                    if let Err(e) = coordinator.execute_handoff(&handoff) {
                        log!(e.level(), "{}", e);
                    }
                }
            }),
        );

        Ok(request.player_id)
    }

    /// Performs a scheduled handoff once the pre-load delay elapsed.
    ///
    /// Skips the switch only when a newer request replaced this one. An entry
    /// already consumed by an arrival notification does not stop the handoff,
    /// only the player leaving the proxy does.
    pub fn execute_handoff(&self, handoff: &Handoff) -> Result<HandoffOutcome, TransferError> {
        let id = handoff.player.id;
        let mut replaced = false;
        self.pending.remove_if(&id, |_, p| {
            replaced = p.generation > handoff.generation;
            p.generation == handoff.generation
        });

        if self.proxy.player(&id).is_none() {
            return Err(TransferError::TransferInterrupted(id));
        }

        if replaced {
            debug!(
                "Skipping handoff of {} to {}, a newer transfer is pending",
                handoff.player.username, handoff.shard.name
            );
            return Ok(HandoffOutcome::Superseded);
        }

        self.proxy.switch_server(&handoff.player, &handoff.shard);

        info!(
            "Seamlessly transferred {} to {} at {}",
            handoff.player.username, handoff.shard.name, handoff.position
        );
        Ok(HandoffOutcome::Executed)
    }

    /// The player's backend connection is about to change.
    ///
    /// Bookkeeping only: clears the player's pending transfer. A handoff
    /// still scheduled for it fires as usual.
    pub fn on_arrival(&self, player_id: &Uuid, server: &str) -> Option<PendingTransfer> {
        let (_, transfer) = self.pending.remove(player_id)?;
        info!(
            "Seamless transfer in progress for {} to {}",
            player_id, server
        );
        debug!(
            "Transfer to {} was requested {:?} ago",
            transfer.shard,
            transfer.age()
        );
        Some(transfer)
    }

    /// Forgets the player's pending transfer. Safe to call any number of times.
    pub fn on_player_disconnect(&self, player_id: &Uuid) -> bool {
        match self.pending.remove(player_id) {
            Some((_, transfer)) => {
                debug!(
                    "Dropped pending transfer of {} to {}, player left the proxy",
                    player_id, transfer.shard
                );
                true
            }
            None => false,
        }
    }

    /// Snapshot of the player's pending transfer
    pub fn pending(&self, player_id: &Uuid) -> Option<PendingTransfer> {
        self.pending.get(player_id).map(|p| p.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Discards every pending transfer and cancels the scheduled handoffs.
    ///
    /// Returns how many transfers were interrupted.
    pub fn shutdown(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let players: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        let interrupted = players
            .iter()
            .filter(|id| self.pending.remove(*id).is_some())
            .count();
        if interrupted > 0 {
            warn!("{} pending transfers will be interrupted", interrupted);
        }

        self.scheduler.shutdown();
        interrupted
    }
}
