//! Async client for the CrowdChess protocol.
//!
//! [`CrowdChessClient`] is a thin handle that communicates with a background
//! connection loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<CrowdChessEvent>`]) returned
//! from [`CrowdChessClient::start`].
//!
//! The background loop owns the socket for the whole process lifetime: on an
//! unexpected close it discards the dead transport, re-dials through the
//! [`Connector`] with exponential backoff, and replays the `join_game` for the
//! currently viewed game once the connection reopens. Requests issued while
//! the socket is down are dropped with a log line — callers must not assume
//! delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("wss://example.com/ws");
//! let (client, mut events) = CrowdChessClient::start(connector, CrowdChessConfig::new());
//!
//! client.set_wallet(Some("0xabc".into()));
//! client.begin_viewing("G1");
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CrowdChessEvent::GameState(snapshot) => { /* render */ }
//!         CrowdChessEvent::ReconnectFailed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::board::{Side, Square};
use crate::event::CrowdChessEvent;
use crate::gatekeeper::{ActionContext, VoteRejection};
use crate::identity::SessionIdentity;
use crate::lobby::{LobbyMirror, PlayerRole, RoleCache, StatusFilter};
use crate::mirror::{GameMirror, GameSnapshot, PendingMove, DEFAULT_TURN_TIME_LIMIT_MS};
use crate::protocol::{ClientMessage, GameSummary, ServerMessage};
use crate::registry::{SubscriberSet, Subscription};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default base delay for reconnect backoff (doubles per attempt).
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum number of reconnect attempts before giving up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default timeout for a `check_player_status` round trip.
const DEFAULT_STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`CrowdChessClient`].
///
/// All fields have sensible defaults; construct with [`CrowdChessConfig::new`]
/// and override selectively.
///
/// # Example
///
/// ```
/// use crowdchess_client::client::CrowdChessConfig;
/// use std::time::Duration;
///
/// let config = CrowdChessConfig::new()
///     .with_max_reconnect_attempts(8)
///     .with_status_query_timeout(Duration::from_secs(2));
/// assert_eq!(config.max_reconnect_attempts, 8);
/// ```
#[derive(Debug, Clone)]
pub struct CrowdChessConfig {
    /// Base delay for reconnect backoff; the actual delay doubles with every
    /// consecutive failed attempt. Defaults to **1 second**.
    pub reconnect_base_delay: Duration,
    /// Maximum consecutive reconnect attempts before the client gives up and
    /// stays disconnected. The counter resets on every successful open.
    /// Defaults to **5**.
    pub max_reconnect_attempts: u32,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the connection
    /// loop. The `Disconnected` event is always delivered regardless of
    /// capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long a `check_player_status` call waits for a matching response
    /// before resolving to "no team". Defaults to **5 seconds**.
    pub status_query_timeout: Duration,
    /// Voting-round length used when resetting the local clock after a move
    /// executes. Defaults to **10 000 ms**, matching the backend.
    pub turn_time_limit_ms: u64,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`CrowdChessClient::shutdown`] is called, the background loop is
    /// given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl CrowdChessConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            status_query_timeout: DEFAULT_STATUS_QUERY_TIMEOUT,
            turn_time_limit_ms: DEFAULT_TURN_TIME_LIMIT_MS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_status_query_timeout(mut self, timeout: Duration) -> Self {
        self.status_query_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_turn_time_limit_ms(mut self, limit_ms: u64) -> Self {
        self.turn_time_limit_ms = limit_ms;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for CrowdChessConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// A pending `check_player_status` round trip.
struct StatusWaiter {
    id: u64,
    game_id: String,
    wallet: String,
    tx: oneshot::Sender<Option<Side>>,
}

/// State shared between the client handle and the connection loop.
///
/// Every mutex here is leaf-level: locks are held for short sections and
/// never across an `.await`, so there is no ordering discipline to violate.
struct Shared {
    connected: AtomicBool,
    identity: StdMutex<SessionIdentity>,
    mirror: StdMutex<Option<GameMirror>>,
    roles: StdMutex<RoleCache>,
    lobby: StdMutex<LobbyMirror>,
    waiters: StdMutex<Vec<StatusWaiter>>,
    waiter_seq: AtomicU64,
    snapshot_subs: SubscriberSet<GameSnapshot>,
    lobby_subs: SubscriberSet<Vec<GameSummary>>,
    event_tx: mpsc::Sender<CrowdChessEvent>,
    turn_time_limit_ms: u64,
}

impl Shared {
    fn new(event_tx: mpsc::Sender<CrowdChessEvent>, turn_time_limit_ms: u64) -> Self {
        Self {
            connected: AtomicBool::new(false),
            identity: StdMutex::new(SessionIdentity::new()),
            mirror: StdMutex::new(None),
            roles: StdMutex::new(RoleCache::new()),
            lobby: StdMutex::new(LobbyMirror::new()),
            waiters: StdMutex::new(Vec::new()),
            waiter_seq: AtomicU64::new(0),
            snapshot_subs: SubscriberSet::new(),
            lobby_subs: SubscriberSet::new(),
            event_tx,
            turn_time_limit_ms,
        }
    }
}

/// Lock a leaf mutex, ignoring poisoning: a panicked subscriber callback must
/// not wedge the whole client.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the CrowdChess protocol.
///
/// Created via [`CrowdChessClient::start`], which spawns a background
/// connection loop and returns this handle together with an event receiver.
///
/// Request methods serialize a [`ClientMessage`] and queue it to the loop.
/// They return immediately; if the socket is not open the message is dropped
/// with a log line (callers must not assume delivery). Action methods
/// (`propose_move`, `vote_on_move`, …) additionally run the local gatekeeper
/// checks first and return a typed [`VoteRejection`] without touching the
/// network when a precondition fails.
pub struct CrowdChessClient {
    /// Sender half of the command channel to the connection loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the connection loop.
    shared: Arc<Shared>,
    /// Handle to the background connection loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    status_query_timeout: Duration,
}

impl CrowdChessClient {
    /// Start the client and return a handle plus event receiver.
    ///
    /// The connection loop dials through `connector` immediately and keeps
    /// re-dialing with exponential backoff for the lifetime of the client.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C: Connector>(
        connector: C,
        config: CrowdChessConfig,
    ) -> (Self, mpsc::Receiver<CrowdChessEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<CrowdChessEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(Shared::new(event_tx, config.turn_time_limit_ms));
        let loop_shared = Arc::clone(&shared);

        let task = tokio::spawn(connection_loop(
            connector,
            cmd_rx,
            loop_shared,
            shutdown_rx,
            config.reconnect_base_delay,
            config.max_reconnect_attempts,
        ));

        let client = Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            status_query_timeout: config.status_query_timeout,
        };

        (client, event_rx)
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Connect or disconnect the wallet. A pure local switch with no network
    /// side effect — the identity reaches the backend as a field on the next
    /// outgoing request.
    pub fn set_wallet(&self, address: Option<String>) {
        debug!(wallet = ?address, "wallet identity changed");
        lock(&self.shared.identity).set_wallet(address);
    }

    /// The identifier currently stamped on outgoing requests.
    pub fn identifier(&self) -> String {
        lock(&self.shared.identity).current().to_string()
    }

    pub fn is_wallet_connected(&self) -> bool {
        lock(&self.shared.identity).is_wallet_connected()
    }

    /// True while the backend has not yet assigned a canonical id for the
    /// current connection (the identity-reconciliation window).
    pub fn identity_pending(&self) -> bool {
        lock(&self.shared.identity).canonical_pending()
    }

    // ── Viewing a game ──────────────────────────────────────────────

    /// Begin viewing `game_id`: discards any previous snapshot and pending
    /// move, installs a fresh default snapshot (standard starting board, so
    /// the UI has something to render before the first push), sends
    /// `join_game`, and republishes the initial snapshot to subscribers.
    ///
    /// Deltas for other game ids are ignored while this view is active.
    pub fn begin_viewing(&self, game_id: impl Into<String>) -> GameSnapshot {
        let game_id = game_id.into();
        debug!(%game_id, "begin viewing");
        let snapshot = GameSnapshot::with_turn_limit(&game_id, self.shared.turn_time_limit_ms);
        *lock(&self.shared.mirror) = Some(GameMirror::new(snapshot.clone()));

        self.send(ClientMessage::JoinGame { game_id });

        self.shared.snapshot_subs.publish(&snapshot);
        emit_event(&self.shared, CrowdChessEvent::GameState(Box::new(snapshot.clone())));
        snapshot
    }

    /// Stop viewing the current game, discarding its snapshot and pending
    /// move. Delta routing for the departed game stops synchronously — a
    /// push arriving after this call is dropped, not delivered to stale
    /// subscribers.
    pub fn stop_viewing(&self) {
        if let Some(mirror) = lock(&self.shared.mirror).take() {
            debug!(game_id = %mirror.game_id(), "stopped viewing");
        }
    }

    /// The game currently being viewed, if any.
    pub fn current_game_id(&self) -> Option<String> {
        lock(&self.shared.mirror)
            .as_ref()
            .map(|m| m.game_id().to_string())
    }

    /// A clone of the current snapshot, if a game is being viewed.
    pub fn snapshot(&self) -> Option<GameSnapshot> {
        lock(&self.shared.mirror)
            .as_ref()
            .map(|m| m.snapshot().clone())
    }

    /// The staged-but-unconfirmed move, if any.
    pub fn pending_move(&self) -> Option<PendingMove> {
        lock(&self.shared.mirror).as_ref().and_then(|m| m.pending())
    }

    /// Subscribe to snapshot updates. The callback receives the full updated
    /// snapshot after every applied delta — never a partial patch. Dropping
    /// the returned [`Subscription`] deregisters exactly this callback.
    #[must_use = "dropping the subscription immediately unsubscribes the callback"]
    pub fn on_game_state(
        &self,
        callback: impl Fn(&GameSnapshot) + Send + Sync + 'static,
    ) -> Subscription<GameSnapshot> {
        self.shared.snapshot_subs.subscribe(callback)
    }

    /// Subscribe to full games-list replacements.
    #[must_use = "dropping the subscription immediately unsubscribes the callback"]
    pub fn on_lobby_update(
        &self,
        callback: impl Fn(&Vec<GameSummary>) + Send + Sync + 'static,
    ) -> Subscription<Vec<GameSummary>> {
        self.shared.lobby_subs.subscribe(callback)
    }

    // ── Action gatekeeper ───────────────────────────────────────────

    /// Stage a new move proposal after checking every local precondition
    /// (wallet, game ready, turn, clock, not-yet-voted, piece on the source
    /// square). Purely local: nothing is sent until
    /// [`confirm_pending_move`](Self::confirm_pending_move). Staging while a
    /// proposal is already pending overwrites it.
    pub fn propose_move(
        &self,
        from: Square,
        to: Square,
    ) -> std::result::Result<PendingMove, VoteRejection> {
        let (wallet_connected, identifier) = self.identity_parts();
        let mut mirror_guard = lock(&self.shared.mirror);
        let side = self.side_for(mirror_guard.as_ref(), &identifier);
        let ctx = ActionContext {
            wallet_connected,
            snapshot: mirror_guard.as_ref().map(|m| m.snapshot()),
            side,
            identifier: &identifier,
        };
        let piece = ctx.check_propose(from)?;

        let pending = PendingMove { from, to, piece };
        if let Some(mirror) = mirror_guard.as_mut() {
            mirror.stage(pending);
        }
        debug!(%from, %to, "move proposal staged");
        Ok(pending)
    }

    /// Send the staged proposal as a vote. The backend treats voting for a
    /// not-yet-proposed move as implicitly creating the proposal, so this is
    /// a single `vote_move` either way. Clears the pending move.
    pub fn confirm_pending_move(&self) -> std::result::Result<String, VoteRejection> {
        let (pending, game_id) = {
            let mut mirror_guard = lock(&self.shared.mirror);
            let mirror = mirror_guard.as_mut().ok_or(VoteRejection::NothingToConfirm)?;
            let pending = mirror.take_pending().ok_or(VoteRejection::NothingToConfirm)?;
            (pending, mirror.game_id().to_string())
        };
        let move_id = format!("{}{}", pending.from, pending.to);
        self.send(ClientMessage::VoteMove {
            game_id,
            r#move: move_id.clone(),
            player_id: self.identifier(),
        });
        Ok(move_id)
    }

    /// Discard the staged proposal without any network call.
    pub fn cancel_pending_move(&self) {
        if let Some(mirror) = lock(&self.shared.mirror).as_mut() {
            if mirror.take_pending().is_some() {
                debug!("pending move cancelled");
            }
        }
    }

    /// Vote for an existing proposal. Same preconditions as
    /// [`propose_move`](Self::propose_move) minus the source-square check,
    /// and *no confirmation step*: the vote is sent immediately. The
    /// asymmetry with the propose/confirm path is deliberate — confirmation
    /// friction applies only to brand-new proposals.
    pub fn vote_on_move(&self, move_id: &str) -> std::result::Result<(), VoteRejection> {
        let (wallet_connected, identifier) = self.identity_parts();
        let game_id = {
            let mirror_guard = lock(&self.shared.mirror);
            let side = self.side_for(mirror_guard.as_ref(), &identifier);
            let ctx = ActionContext {
                wallet_connected,
                snapshot: mirror_guard.as_ref().map(|m| m.snapshot()),
                side,
                identifier: &identifier,
            };
            ctx.check_vote()?.game_id.clone()
        };
        self.send(ClientMessage::VoteMove {
            game_id,
            r#move: move_id.to_string(),
            player_id: identifier,
        });
        Ok(())
    }

    /// Whether the local preconditions currently allow this player to vote.
    pub fn is_voting_enabled(&self) -> bool {
        let (wallet_connected, identifier) = self.identity_parts();
        let mirror_guard = lock(&self.shared.mirror);
        let side = self.side_for(mirror_guard.as_ref(), &identifier);
        ActionContext {
            wallet_connected,
            snapshot: mirror_guard.as_ref().map(|m| m.snapshot()),
            side,
            identifier: &identifier,
        }
        .check_vote()
        .is_ok()
    }

    // ── Teams, matchmaking, lobby ───────────────────────────────────

    /// Join one side of a game. Requires a connected wallet. The role is
    /// recorded locally before the backend confirms, matching the optimistic
    /// flow the UI expects.
    pub fn join_team(&self, game_id: &str, team: Side) -> std::result::Result<(), VoteRejection> {
        let (wallet_connected, identifier) = self.identity_parts();
        if !wallet_connected {
            return Err(VoteRejection::WalletNotConnected);
        }
        lock(&self.shared.roles).insert(game_id, &identifier, PlayerRole::Team(team));
        self.send(ClientMessage::JoinTeam {
            game_id: game_id.to_string(),
            team,
            player_id: identifier,
        });
        Ok(())
    }

    /// Watch a game as a read-only spectator.
    pub fn watch_game(&self, game_id: &str) {
        let identifier = self.identifier();
        lock(&self.shared.roles).insert(game_id, &identifier, PlayerRole::Spectator);
        self.send(ClientMessage::WatchGame {
            game_id: game_id.to_string(),
        });
    }

    /// Enter the matchmaking queue. Requires a connected wallet; the pairing
    /// arrives later as [`CrowdChessEvent::MatchFound`].
    pub fn join_matchmaking(&self) -> std::result::Result<(), VoteRejection> {
        let wallet = lock(&self.shared.identity)
            .wallet()
            .map(str::to_string)
            .ok_or(VoteRejection::WalletNotConnected)?;
        self.send(ClientMessage::JoinMatchmaking {
            wallet_address: wallet,
        });
        Ok(())
    }

    /// Leave the matchmaking queue.
    pub fn leave_matchmaking(&self) {
        self.send(ClientMessage::LeaveMatchmaking);
    }

    /// Request the full games list. The response (and any later unsolicited
    /// update) replaces the lobby mirror wholesale.
    pub fn request_games_list(&self) {
        self.send(ClientMessage::RequestGamesList);
    }

    /// The most recent full games list.
    pub fn lobby_games(&self) -> Vec<GameSummary> {
        lock(&self.shared.lobby).games().to_vec()
    }

    /// Pure client-side filtering over the held games list; no network call.
    pub fn filtered_games(&self, filter: StatusFilter) -> Vec<GameSummary> {
        lock(&self.shared.lobby).filtered(filter)
    }

    /// Request legal-move hints for a game's current position.
    pub fn request_valid_moves(&self, game_id: &str) {
        self.send(ClientMessage::GetValidMoves {
            game_id: game_id.to_string(),
        });
    }

    // ── Permit flow ─────────────────────────────────────────────────

    /// Ask the backend for the EIP-712 permit data to sign. The data arrives
    /// as [`CrowdChessEvent::PermitData`]; signing happens in the external
    /// wallet and may take arbitrarily long (or never complete).
    pub fn request_permit(&self) -> std::result::Result<(), VoteRejection> {
        let wallet = lock(&self.shared.identity)
            .wallet()
            .map(str::to_string)
            .ok_or(VoteRejection::WalletNotConnected)?;
        self.send(ClientMessage::RequestPermit {
            wallet_address: wallet,
        });
        Ok(())
    }

    /// Submit the wallet's signature over previously requested permit data.
    pub fn submit_permit_signature(
        &self,
        signature: &str,
    ) -> std::result::Result<(), VoteRejection> {
        let wallet = lock(&self.shared.identity)
            .wallet()
            .map(str::to_string)
            .ok_or(VoteRejection::WalletNotConnected)?;
        self.send(ClientMessage::SubmitPermitSignature {
            wallet_address: wallet,
            signature: signature.to_string(),
        });
        Ok(())
    }

    // ── Player status ───────────────────────────────────────────────

    /// Which side, if any, `wallet_address` occupies in `game_id`.
    ///
    /// Answers from the per-(game, identifier) cache when possible; otherwise
    /// sends a `check_player_status` query and waits for the matching
    /// response, resolving to `None` after the configured timeout rather than
    /// hanging. Concurrent queries for the same key are tolerated — results
    /// are idempotent and the cache is overwrite-safe.
    pub async fn check_player_status(&self, game_id: &str, wallet_address: &str) -> Option<Side> {
        if let Some(role) = lock(&self.shared.roles).get(game_id, wallet_address) {
            return role.side();
        }

        let (tx, rx) = oneshot::channel();
        let id = self.shared.waiter_seq.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.waiters).push(StatusWaiter {
            id,
            game_id: game_id.to_string(),
            wallet: wallet_address.to_string(),
            tx,
        });
        self.send(ClientMessage::CheckPlayerStatus {
            game_id: game_id.to_string(),
            wallet_address: wallet_address.to_string(),
        });

        match tokio::time::timeout(self.status_query_timeout, rx).await {
            Ok(Ok(team)) => team,
            // Timeout or loop exit: resolve to "no team" instead of hanging,
            // and reap the abandoned waiter.
            _ => {
                lock(&self.shared.waiters).retain(|w| w.id != id);
                debug!(game_id, wallet_address, "player status query timed out");
                None
            }
        }
    }

    /// Resolve the viewer's role in `game_id`: local cache first, then a
    /// backend status query (wallet connected only).
    pub async fn player_role(&self, game_id: &str) -> PlayerRole {
        let (wallet_connected, identifier) = self.identity_parts();
        if let Some(role) = lock(&self.shared.roles).get(game_id, &identifier) {
            if role != PlayerRole::None {
                return role;
            }
        }
        if wallet_connected {
            if let Some(side) = self.check_player_status(game_id, &identifier).await {
                return PlayerRole::Team(side);
            }
        }
        PlayerRole::None
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the connection loop exits.
    pub async fn shutdown(&mut self) {
        debug!("CrowdChessClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.connected.store(false, Ordering::Release);
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a message to the connection loop. Fails silently (logs only)
    /// when the socket is not open — callers must not assume delivery.
    fn send(&self, msg: ClientMessage) {
        if self.cmd_tx.send(msg).is_err() {
            warn!("connection loop has exited, dropping outgoing message");
        }
    }

    fn identity_parts(&self) -> (bool, String) {
        let identity = lock(&self.shared.identity);
        (identity.is_wallet_connected(), identity.current().to_string())
    }

    fn side_for(&self, mirror: Option<&GameMirror>, identifier: &str) -> Option<Side> {
        let mirror = mirror?;
        lock(&self.shared.roles)
            .get(mirror.game_id(), identifier)
            .and_then(PlayerRole::side)
    }
}

impl std::fmt::Debug for CrowdChessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdChessClient")
            .field("connected", &self.is_connected())
            .field("identifier", &self.identifier())
            .field("viewing", &self.current_game_id())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for CrowdChessClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the connection loop future to be dropped immediately. The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending it
        // would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

enum LoopExit {
    Shutdown,
    ConnectionLost(Option<String>),
}

/// Background loop that owns the transport for the client's lifetime.
///
/// Dials through the connector, runs the send/receive multiplexer until the
/// connection drops, then backs off exponentially (base delay doubling per
/// consecutive failed attempt, counter reset on success) and re-dials. After
/// the attempt budget is exhausted the loop emits `ReconnectFailed` and stays
/// disconnected, draining (and dropping) outgoing messages until shutdown.
async fn connection_loop<C: Connector>(
    mut connector: C,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
    reconnect_base_delay: Duration,
    max_reconnect_attempts: u32,
) {
    debug!("connection loop started");
    let mut attempts: u32 = 0;

    loop {
        match connector.connect().await {
            Ok(mut transport) => {
                attempts = 0;
                shared.connected.store(true, Ordering::Release);
                emit_event(&shared, CrowdChessEvent::Connected);

                // Replay the viewed game's join so a drop mid-game resumes
                // the delta stream without caller intervention.
                let replay_error = replay_join(&mut transport, &shared).await;
                let exit = match replay_error {
                    Some(reason) => LoopExit::ConnectionLost(Some(reason)),
                    None => {
                        run_connection(&mut transport, &mut cmd_rx, &shared, &mut shutdown_rx)
                            .await
                    }
                };

                match exit {
                    LoopExit::Shutdown => {
                        let _ = transport.close().await;
                        emit_disconnected(&shared, Some("client shut down".into())).await;
                        debug!("connection loop exited");
                        return;
                    }
                    LoopExit::ConnectionLost(reason) => {
                        emit_disconnected(&shared, reason).await;
                        lock(&shared.identity).mark_reconnecting();
                        // The dead transport is dropped here, before the next
                        // dial — at most one live socket at a time.
                    }
                }
            }
            Err(e) => {
                warn!("connection attempt failed: {e}");
            }
        }

        if attempts >= max_reconnect_attempts {
            warn!(attempts, "reconnect attempts exhausted; staying disconnected");
            emit_event(&shared, CrowdChessEvent::ReconnectFailed { attempts });
            drain_until_shutdown(&mut cmd_rx, &mut shutdown_rx).await;
            debug!("connection loop exited");
            return;
        }

        let delay = reconnect_base_delay.saturating_mul(2u32.saturating_pow(attempts));
        attempts += 1;
        debug!(?delay, attempt = attempts, "scheduling reconnect");
        if !backoff(delay, &mut cmd_rx, &mut shutdown_rx).await {
            debug!("connection loop exited");
            return;
        }
    }
}

/// Re-send `join_game` for the currently viewed game after a (re)connect.
/// Returns the failure reason if the fresh transport is already dead.
async fn replay_join(transport: &mut impl Transport, shared: &Shared) -> Option<String> {
    let game_id = lock(&shared.mirror)
        .as_ref()
        .map(|m| m.game_id().to_string())?;
    debug!(%game_id, "replaying join_game for viewed game");
    let msg = ClientMessage::JoinGame { game_id };
    match serde_json::to_string(&msg) {
        Ok(json) => match transport.send(json).await {
            Ok(()) => None,
            Err(e) => {
                error!("transport send error during join replay: {e}");
                Some(format!("transport send error: {e}"))
            }
        },
        Err(e) => {
            error!("failed to serialize join replay: {e}");
            None
        }
    }
}

/// Multiplex outgoing commands and inbound messages over one transport until
/// it drops or the client shuts down.
async fn run_connection(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shared: &Shared,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> LoopExit {
    loop {
        tokio::select! {
            // Branch 1: outgoing command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    return LoopExit::ConnectionLost(
                                        Some(format!("transport send error: {e}")),
                                    );
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down connection loop");
                        return LoopExit::Shutdown;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return LoopExit::Shutdown;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => dispatch(shared, server_msg),
                            Err(e) => {
                                // Unknown `type` tags land here too: dropped, never fatal.
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return LoopExit::ConnectionLost(
                            Some(format!("transport receive error: {e}")),
                        );
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        return LoopExit::ConnectionLost(None);
                    }
                }
            }
        }
    }
}

/// Sleep out a backoff delay while staying responsive to shutdown and
/// dropping (not queueing) messages sent while the socket is down.
/// Returns `false` when the loop should exit instead of reconnecting.
async fn backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            _ = &mut *shutdown_rx => return false,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => warn!(
                        "socket not open, dropping outgoing message: {:?}",
                        std::mem::discriminant(&msg)
                    ),
                    None => return false,
                }
            }
        }
    }
}

/// Terminal state after reconnect exhaustion: keep draining (and dropping)
/// outgoing messages so senders observe silent failure, until shutdown.
async fn drain_until_shutdown(
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => return,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => warn!(
                        "permanently disconnected, dropping outgoing message: {:?}",
                        std::mem::discriminant(&msg)
                    ),
                    None => return,
                }
            }
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Route one inbound message: update identity/mirror/lobby state, then emit
/// the corresponding event. Events are dispatched in receipt order; deltas
/// for game ids nobody is viewing are dropped here.
fn dispatch(shared: &Shared, msg: ServerMessage) {
    match msg {
        ServerMessage::ClientConnected { client_id } => {
            debug!(%client_id, "canonical identity assigned");
            lock(&shared.identity).adopt_canonical(client_id.clone());
            emit_event(shared, CrowdChessEvent::IdentityAssigned { client_id });
        }
        ServerMessage::MatchFound {
            game_id,
            players,
            assigned_side,
        } => {
            let identifier = lock(&shared.identity).current().to_string();
            lock(&shared.roles).insert(&game_id, &identifier, PlayerRole::Team(assigned_side));
            emit_event(
                shared,
                CrowdChessEvent::MatchFound {
                    game_id,
                    players,
                    assigned_side,
                },
            );
        }
        ServerMessage::VoteUpdate(payload) => {
            apply_and_publish(shared, |mirror| mirror.apply_vote_update(&payload));
        }
        ServerMessage::MoveResult(payload) => {
            apply_and_publish(shared, |mirror| mirror.apply_move_result(&payload));
        }
        ServerMessage::TimerTick {
            game_id,
            seconds_left,
        } => {
            apply_and_publish(shared, |mirror| {
                mirror.apply_timer_tick(&game_id, seconds_left)
            });
        }
        ServerMessage::GameEnd(payload) => {
            let applied = apply_and_publish(shared, |mirror| mirror.apply_game_end(&payload));
            if applied {
                emit_event(shared, CrowdChessEvent::GameEnded(payload));
            }
        }
        ServerMessage::GamesList { games_list } | ServerMessage::GamesListUpdate { games_list } => {
            lock(&shared.lobby).replace(games_list.clone());
            shared.lobby_subs.publish(&games_list);
            emit_event(shared, CrowdChessEvent::LobbyUpdated { games: games_list });
        }
        ServerMessage::NumberOfPlayers { total_connections } => {
            emit_event(shared, CrowdChessEvent::PlayersOnline { total_connections });
        }
        ServerMessage::PlayerStatus {
            game_id,
            wallet_address,
            team,
        } => {
            let role = match team {
                Some(side) => PlayerRole::Team(side),
                None => PlayerRole::None,
            };
            lock(&shared.roles).insert(&game_id, &wallet_address, role);

            let matching: Vec<StatusWaiter> = {
                let mut waiters = lock(&shared.waiters);
                let taken = std::mem::take(&mut *waiters);
                let (matching, rest) = taken
                    .into_iter()
                    .partition(|w| w.game_id == game_id && w.wallet == wallet_address);
                *waiters = rest;
                matching
            };
            for waiter in matching {
                let _ = waiter.tx.send(team);
            }
        }
        ServerMessage::ValidMovesResponse {
            game_id,
            valid_moves,
        } => {
            apply_and_publish(shared, |mirror| {
                mirror.apply_valid_moves(&game_id, &valid_moves)
            });
        }
        ServerMessage::PermitData { permit_data } => {
            emit_event(shared, CrowdChessEvent::PermitData { permit_data });
        }
        ServerMessage::Error { error } => {
            warn!(%error, "server reported error");
            emit_event(shared, CrowdChessEvent::ServerError { message: error });
        }
    }
}

/// Apply a delta to the viewed game's mirror, if one is installed and the
/// delta is accepted, then republish the full updated snapshot to callback
/// subscribers and the event channel. Returns whether the delta was applied.
fn apply_and_publish(shared: &Shared, apply: impl FnOnce(&mut GameMirror) -> bool) -> bool {
    let snapshot = {
        let mut guard = lock(&shared.mirror);
        match guard.as_mut() {
            Some(mirror) => {
                if apply(mirror) {
                    Some(mirror.snapshot().clone())
                } else {
                    None
                }
            }
            None => {
                debug!("delta received while not viewing any game, dropped");
                None
            }
        }
    };
    match snapshot {
        Some(snapshot) => {
            shared.snapshot_subs.publish(&snapshot);
            emit_event(shared, CrowdChessEvent::GameState(Box::new(snapshot)));
            true
        }
        None => false,
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the connection loop.
fn emit_event(shared: &Shared, event: CrowdChessEvent) {
    match shared.event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](CrowdChessEvent::Disconnected) event and update
/// state.
///
/// Uses `send().await` (blocking) instead of `try_send` because
/// `Disconnected` must never be silently dropped, even under backpressure.
async fn emit_disconnected(shared: &Shared, reason: Option<String>) {
    shared.connected.store(false, Ordering::Release);
    let event = CrowdChessEvent::Disconnected { reason };
    if shared.event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::CrowdChessError;
    use crate::protocol::{StatCounters, VoteUpdatePayload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    // ── Mock transport & connector ──────────────────────────────────

    /// A mock transport that records sent messages and replays scripted
    /// responses. An explicit `None` entry signals a clean transport close.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, CrowdChessError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, CrowdChessError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), CrowdChessError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CrowdChessError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted messages delivered — hang forever so the loop
                // stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), CrowdChessError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out scripted transports in order; dialing past the script fails.
    struct MockConnector {
        transports: VecDeque<MockTransport>,
        dials: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new(transports: Vec<MockTransport>) -> (Self, Arc<AtomicUsize>) {
            let dials = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    transports: VecDeque::from(transports),
                    dials: Arc::clone(&dials),
                },
                dials,
            )
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, CrowdChessError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            self.transports
                .pop_front()
                .ok_or(CrowdChessError::TransportClosed)
        }
    }

    // ── JSON fixtures ───────────────────────────────────────────────

    fn client_connected_json(client_id: &str) -> String {
        serde_json::to_string(&ServerMessage::ClientConnected {
            client_id: client_id.into(),
        })
        .unwrap()
    }

    fn vote_update_json(game_id: &str, move_id: &str, votes: u32) -> String {
        serde_json::to_string(&ServerMessage::VoteUpdate(Box::new(VoteUpdatePayload {
            game_id: game_id.into(),
            votes: [(move_id.to_string(), votes)].into_iter().collect(),
            counters: StatCounters::default(),
        })))
        .unwrap()
    }

    fn fast_config() -> CrowdChessConfig {
        CrowdChessConfig::new()
            .with_reconnect_base_delay(Duration::from_millis(5))
            .with_shutdown_timeout(Duration::from_millis(200))
            .with_status_query_timeout(Duration::from_millis(50))
    }

    fn start_with_script(
        incoming: Vec<Option<std::result::Result<String, CrowdChessError>>>,
    ) -> (
        CrowdChessClient,
        mpsc::Receiver<CrowdChessEvent>,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let (transport, sent, _closed) = MockTransport::new(incoming);
        let (connector, _dials) = MockConnector::new(vec![transport]);
        let (client, events) = CrowdChessClient::start(connector, fast_config());
        (client, events, sent)
    }

    // ── Lifecycle tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, CrowdChessEvent::Connected),
            "expected Connected as first event, got {first:?}"
        );
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn client_connected_assigns_canonical_identity() {
        let (mut client, mut events, _sent) =
            start_with_script(vec![Some(Ok(client_connected_json("conn_7")))]);

        let _ = events.recv().await; // Connected
        assert!(client.identity_pending());

        let event = events.recv().await.unwrap();
        if let CrowdChessEvent::IdentityAssigned { client_id } = event {
            assert_eq!(client_id, "conn_7");
        } else {
            panic!("expected IdentityAssigned, got {event:?}");
        }
        assert_eq!(client.identifier(), "conn_7");
        assert!(!client.identity_pending());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (connector, _dials) = MockConnector::new(vec![transport]);
        let (mut client, mut events) = CrowdChessClient::start(connector, fast_config());

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let event = events.recv().await.unwrap();
        if let CrowdChessEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        drop(client);

        // The loop task is aborted; the event channel closes without hanging.
        while let Some(_event) = events.recv().await {}
    }

    // ── Reconnect tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn reconnects_after_transport_close_and_replays_join() {
        // First transport closes immediately; second stays open.
        let (first, _sent1, _closed1) = MockTransport::new(vec![None]);
        let (second, sent2, _closed2) = MockTransport::new(vec![]);
        let (connector, dials) = MockConnector::new(vec![first, second]);
        let (mut client, mut events) = CrowdChessClient::start(connector, fast_config());

        let _ = events.recv().await; // Connected (first)
        let event = events.recv().await.unwrap();
        assert!(matches!(event, CrowdChessEvent::Disconnected { .. }));

        // Begin viewing while disconnected; the join is dropped now but must
        // be replayed automatically once the reconnect succeeds.
        client.begin_viewing("G1");

        // Scan forward to the second Connected (the initial GameState from
        // begin_viewing may arrive on either side of it).
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, CrowdChessEvent::Connected) {
                break;
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dials.load(Ordering::SeqCst), 2);
        {
            let messages = sent2.lock().unwrap();
            let replayed: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            if let ClientMessage::JoinGame { game_id } = replayed {
                assert_eq!(game_id, "G1");
            } else {
                panic!("expected JoinGame replay, got {replayed:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_exhaustion_emits_reconnect_failed() {
        let (connector, dials) = MockConnector::new(vec![]);
        let config = fast_config().with_max_reconnect_attempts(2);
        let (mut client, mut events) = CrowdChessClient::start(connector, config);

        let event = events.recv().await.unwrap();
        if let CrowdChessEvent::ReconnectFailed { attempts } = event {
            assert_eq!(attempts, 2);
        } else {
            panic!("expected ReconnectFailed, got {event:?}");
        }
        // Initial dial + 2 retries, all failed.
        assert_eq!(dials.load(Ordering::SeqCst), 3);
        assert!(!client.is_connected());

        // Sends after exhaustion are silently dropped, never panic.
        client.request_games_list();

        client.shutdown().await;
    }

    #[tokio::test]
    async fn attempt_counter_resets_after_successful_open() {
        // Two transports that close instantly, then one that stays up.
        let (first, _s1, _c1) = MockTransport::new(vec![None]);
        let (second, _s2, _c2) = MockTransport::new(vec![None]);
        let (third, _s3, _c3) = MockTransport::new(vec![]);
        let (connector, dials) = MockConnector::new(vec![first, second, third]);
        let config = fast_config().with_max_reconnect_attempts(1);
        let (mut client, mut events) = CrowdChessClient::start(connector, config);

        // Each successful open resets the budget, so even with a budget of 1
        // the client survives two consecutive drops.
        let mut connected_seen = 0;
        while let Some(event) = events.recv().await {
            if matches!(event, CrowdChessEvent::Connected) {
                connected_seen += 1;
                if connected_seen == 3 {
                    break;
                }
            }
        }
        assert_eq!(dials.load(Ordering::SeqCst), 3);
        assert!(client.is_connected());

        client.shutdown().await;
    }

    // ── Dispatch tests (no transport) ───────────────────────────────

    fn test_shared() -> (Arc<Shared>, mpsc::Receiver<CrowdChessEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        (
            Arc::new(Shared::new(event_tx, DEFAULT_TURN_TIME_LIMIT_MS)),
            event_rx,
        )
    }

    fn vote_update_msg(game_id: &str, move_id: &str, votes: u32) -> ServerMessage {
        ServerMessage::VoteUpdate(Box::new(VoteUpdatePayload {
            game_id: game_id.into(),
            votes: [(move_id.to_string(), votes)].into_iter().collect(),
            counters: StatCounters::default(),
        }))
    }

    #[test]
    fn dispatch_routes_deltas_to_viewed_game_only() {
        let (shared, _event_rx) = test_shared();
        *lock(&shared.mirror) = Some(GameMirror::new(GameSnapshot::new("G1")));

        dispatch(&shared, vote_update_msg("G2", "e2e4", 9));
        assert!(lock(&shared.mirror)
            .as_ref()
            .unwrap()
            .snapshot()
            .proposed_moves
            .is_empty());

        dispatch(&shared, vote_update_msg("G1", "e2e4", 3));
        let snapshot = lock(&shared.mirror).as_ref().unwrap().snapshot().clone();
        assert_eq!(snapshot.proposed_moves.len(), 1);
        assert_eq!(snapshot.proposed_moves[0].votes, 3);
    }

    #[test]
    fn dispatch_without_viewed_game_drops_delta() {
        let (shared, mut event_rx) = test_shared();
        dispatch(&shared, vote_update_msg("G1", "e2e4", 3));
        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_subscribers_see_full_updated_snapshot() {
        let (shared, _event_rx) = test_shared();
        *lock(&shared.mirror) = Some(GameMirror::new(GameSnapshot::new("G1")));

        let seen: Arc<StdMutex<Vec<GameSnapshot>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared
            .snapshot_subs
            .subscribe(move |snapshot: &GameSnapshot| {
                sink.lock().unwrap().push(snapshot.clone());
            });

        dispatch(&shared, vote_update_msg("G1", "e2e4", 3));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        // Full snapshot, not a patch: untouched defaults are present.
        assert_eq!(seen[0].proposed_moves[0].id, "e2e4");
        assert_eq!(seen[0].current_turn, Side::White);
        assert_eq!(seen[0].board.pieces().count(), 32);
    }

    #[test]
    fn games_list_replaces_lobby_and_notifies() {
        let (shared, _event_rx) = test_shared();
        let list = vec![GameSummary {
            id: "G1".into(),
            ..GameSummary::default()
        }];
        dispatch(
            &shared,
            ServerMessage::GamesList {
                games_list: list.clone(),
            },
        );
        assert_eq!(lock(&shared.lobby).games(), &list[..]);

        dispatch(
            &shared,
            ServerMessage::GamesListUpdate { games_list: vec![] },
        );
        assert!(lock(&shared.lobby).games().is_empty());
    }

    #[test]
    fn player_status_resolves_waiters_and_caches() {
        let (shared, _event_rx) = test_shared();
        let (tx, mut rx) = oneshot::channel();
        lock(&shared.waiters).push(StatusWaiter {
            id: 0,
            game_id: "G1".into(),
            wallet: "0xabc".into(),
            tx,
        });

        dispatch(
            &shared,
            ServerMessage::PlayerStatus {
                game_id: "G1".into(),
                wallet_address: "0xabc".into(),
                team: Some(Side::Black),
            },
        );

        assert_eq!(rx.try_recv().unwrap(), Some(Side::Black));
        assert!(lock(&shared.waiters).is_empty());
        assert_eq!(
            lock(&shared.roles).get("G1", "0xabc"),
            Some(PlayerRole::Team(Side::Black))
        );
    }

    // ── Gatekeeper-through-client tests ─────────────────────────────

    #[tokio::test]
    async fn propose_move_requires_wallet_first() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        // No wallet, no game: the wallet rejection must come first.
        let err = client
            .propose_move("e2".parse().unwrap(), "e4".parse().unwrap())
            .unwrap_err();
        assert_eq!(err, VoteRejection::WalletNotConnected);

        client.set_wallet(Some("0xabc".into()));
        let err = client
            .propose_move("e2".parse().unwrap(), "e4".parse().unwrap())
            .unwrap_err();
        assert_eq!(err, VoteRejection::GameNotReady);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn propose_confirm_sends_single_vote_move() {
        let (mut client, mut events, sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::White).unwrap();
        client.begin_viewing("G1");

        let pending = client
            .propose_move("e2".parse().unwrap(), "e4".parse().unwrap())
            .unwrap();
        assert_eq!(pending.from.to_string(), "e2");
        assert_eq!(client.pending_move(), Some(pending));
        // Proposing is purely local staging: only join_team + join_game on
        // the wire so far.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sent.lock().unwrap().len(), 2);

        let move_id = client.confirm_pending_move().unwrap();
        assert_eq!(move_id, "e2e4");
        assert!(client.pending_move().is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::VoteMove {
                game_id,
                r#move,
                player_id,
            } = last
            {
                assert_eq!(game_id, "G1");
                assert_eq!(r#move, "e2e4");
                assert_eq!(player_id, "0xabc");
            } else {
                panic!("expected VoteMove, got {last:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn vote_on_existing_move_skips_confirmation() {
        let (mut client, mut events, sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::White).unwrap();
        client.begin_viewing("G1");

        client.vote_on_move("d2d4").unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::VoteMove { .. }));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_discards_pending_without_network() {
        let (mut client, mut events, sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::White).unwrap();
        client.begin_viewing("G1");

        client
            .propose_move("e2".parse().unwrap(), "e4".parse().unwrap())
            .unwrap();
        client.cancel_pending_move();
        assert!(client.pending_move().is_none());
        assert_eq!(
            client.confirm_pending_move().unwrap_err(),
            VoteRejection::NothingToConfirm
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        // join_team + join_game only; the cancelled proposal never hit the wire.
        assert_eq!(sent.lock().unwrap().len(), 2);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn stop_viewing_discards_snapshot_and_pending() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::White).unwrap();
        client.begin_viewing("G1");
        client
            .propose_move("e2".parse().unwrap(), "e4".parse().unwrap())
            .unwrap();

        client.stop_viewing();
        assert!(client.snapshot().is_none());
        assert!(client.current_game_id().is_none());
        assert!(client.pending_move().is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn switching_games_discards_previous_snapshot() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.begin_viewing("G1");
        client.begin_viewing("G2");
        assert_eq!(client.current_game_id().as_deref(), Some("G2"));

        client.shutdown().await;
    }

    // ── Status query tests ──────────────────────────────────────────

    #[tokio::test]
    async fn status_query_times_out_to_empty_result() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        // No player_status response scripted: the call must resolve (to
        // None), not hang, and the abandoned waiter must be reaped.
        let team = client.check_player_status("G1", "0xabc").await;
        assert_eq!(team, None);
        assert!(lock(&client.shared.waiters).is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn status_query_answers_from_cache_without_network() {
        let (mut client, mut events, sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::Black).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let wire_count = sent.lock().unwrap().len();

        let team = client.check_player_status("G1", "0xabc").await;
        assert_eq!(team, Some(Side::Black));
        // Cache hit: no additional request went out.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sent.lock().unwrap().len(), wire_count);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn player_role_resolves_from_local_cache() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        client.set_wallet(Some("0xabc".into()));
        client.join_team("G1", Side::White).unwrap();
        assert_eq!(
            client.player_role("G1").await,
            PlayerRole::Team(Side::White)
        );

        client.watch_game("G2");
        assert_eq!(client.player_role("G2").await, PlayerRole::Spectator);

        client.shutdown().await;
    }

    // ── Config tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn config_defaults() {
        let config = CrowdChessConfig::new();
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.status_query_timeout, Duration::from_secs(5));
        assert_eq!(config.turn_time_limit_ms, 10_000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = CrowdChessConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (mut client, mut events, _sent) = start_with_script(vec![]);
        let _ = events.recv().await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("CrowdChessClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn event_backpressure_does_not_block_the_loop() {
        // More vote updates than the channel can hold, unread.
        let mut incoming: Vec<Option<std::result::Result<String, CrowdChessError>>> = Vec::new();
        for i in 0..30 {
            incoming.push(Some(Ok(vote_update_json("G1", "e2e4", i))));
        }
        incoming.push(None);

        let (transport, _sent, _closed) = MockTransport::new(incoming);
        let (connector, _dials) = MockConnector::new(vec![transport]);
        let config = fast_config()
            .with_event_channel_capacity(1)
            .with_max_reconnect_attempts(0);
        let (mut client, mut events) = CrowdChessClient::start(connector, config);
        client.begin_viewing("G1");

        // Let the loop chew through the script while nobody reads events.
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Drain until the channel goes quiet. The handle keeps the channel
        // open, so an end-of-stream wait would hang; a short idle timeout
        // marks the drain as complete instead.
        let mut count = 0;
        while let Ok(Some(_event)) =
            tokio::time::timeout(Duration::from_millis(50), events.recv()).await
        {
            count += 1;
        }
        // Some events were dropped, but the loop made it to the end of the
        // script (Disconnected is always delivered).
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(count < 32, "expected backpressure to drop events, got {count}");

        client.shutdown().await;
    }
}
