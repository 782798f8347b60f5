use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// A player connected to the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerHandle {
    pub(crate) id: Uuid,
    pub(crate) username: String,
}

impl PlayerHandle {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        PlayerHandle {
            id,
            username: username.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// A backend shard registered on the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardHandle {
    pub(crate) name: String,
    pub(crate) address: String,
}

impl ShardHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        ShardHandle {
            name: name.into(),
            address: address.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// What the coordinator needs from the proxy that holds the live connections
pub trait Proxy: Send + Sync {
    /// Looks up a connected player, `None` once they left the proxy
    fn player(&self, id: &Uuid) -> Option<PlayerHandle>;

    /// Looks up a registered backend shard by name
    fn server(&self, name: &str) -> Option<ShardHandle>;

    /// Moves the player's backend connection to `shard`.
    ///
    /// Fire and forget, the outcome is never reported back.
    fn switch_server(&self, player: &PlayerHandle, shard: &ShardHandle);
}

/// Connection events raised by the proxy host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// The player's backend connection is about to change, for any reason
    ServerPreConnect { player_id: Uuid, server: String },

    /// The player left the proxy entirely
    Disconnect { player_id: Uuid },
}

#[derive(Debug, Clone)]
struct ConnectedPlayer {
    handle: PlayerHandle,
    server: Option<String>,
}

/// In-memory proxy host used when running standalone
///
/// Keeps the player and server registries and reports connection changes
/// as [`ProxyEvent`]s.
pub struct LocalProxy {
    players: Arc<DashMap<Uuid, ConnectedPlayer>>,
    servers: Arc<DashMap<String, ShardHandle>>,
    events: UnboundedSender<ProxyEvent>,
}

impl LocalProxy {
    pub fn new() -> (LocalProxy, UnboundedReceiver<ProxyEvent>) {
        let (events, receiver) = unbounded_channel();
        let proxy = LocalProxy {
            players: Arc::new(DashMap::new()),
            servers: Arc::new(DashMap::new()),
            events,
        };
        (proxy, receiver)
    }

    pub fn register_server(&self, shard: ShardHandle) {
        info!("Registered server {} ({})", shard.name(), shard.address());
        self.servers.insert(shard.name.clone(), shard);
    }

    /// Adds a player to the proxy and connects them to their first server
    pub fn join(&self, player: PlayerHandle, server: Option<&str>) {
        let id = player.id;
        self.players.insert(
            id,
            ConnectedPlayer {
                handle: player,
                server: None,
            },
        );

        if let Some(server) = server {
            self.set_server(&id, server);
        }
    }

    /// Removes a player from the proxy
    pub fn leave(&self, id: &Uuid) {
        if self.players.remove(id).is_some() {
            self.emit(ProxyEvent::Disconnect { player_id: *id });
        }
    }

    /// Name of the server the player is currently connected to
    pub fn current_server(&self, id: &Uuid) -> Option<String> {
        self.players.get(id).and_then(|p| p.server.clone())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    fn set_server(&self, id: &Uuid, server: &str) {
        // Pre-connect fires before the connection actually changes
        self.emit(ProxyEvent::ServerPreConnect {
            player_id: *id,
            server: server.to_string(),
        });

        if let Some(mut player) = self.players.get_mut(id) {
            player.server = Some(server.to_string());
        }
    }

    fn emit(&self, event: ProxyEvent) {
        if self.events.send(event).is_err() {
            trace!("No proxy event listener, dropping event");
        }
    }
}

impl Proxy for LocalProxy {
    fn player(&self, id: &Uuid) -> Option<PlayerHandle> {
        self.players.get(id).map(|p| p.handle.clone())
    }

    fn server(&self, name: &str) -> Option<ShardHandle> {
        self.servers.get(name).map(|s| s.clone())
    }

    fn switch_server(&self, player: &PlayerHandle, shard: &ShardHandle) {
        if !self.players.contains_key(&player.id) {
            debug!("{} left before switching to {}", player.username, shard.name);
            return;
        }
        self.set_server(&player.id, &shard.name);
    }
}
