//! Multiplayer coordinator
//!
//! Owns the connection registry, the rooms and the open trades, and routes
//! every inbound [`ClientMessage`] to the service that handles it. Results
//! go back to the sender, to a specific player, or to the sender's room.
//!
//! Failures never escape [`Coordinator::handle`]: they are logged and turned
//! into an `error` message for the client that caused them.

use crate::auth::Authenticator;
use crate::context::SimContext;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventBus};
use crate::locks::LockKey;
use crate::market::MarketEngine;
use crate::room::RoomRegistry;
use crate::scheduler::{blocking, run_with_retry, spawn_periodic};
use crate::services::GameService;
use crate::session::SessionRegistry;
use crate::trades::TradeBook;
use crate::weather::WeatherEngine;
use growroom_core::{
    BreedOutcome, ConnectionId, GeneticsId, PlayerId, RoomId, TradeId, TradeItem, TradeItems,
    TradeOffer, TradeStatus,
};
use growroom_db::sequence;
use growroom_net::{decode_line, BreedingAttempt, ClientMessage, Connection, ServerMessage};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Coordinator {
    ctx: Arc<SimContext>,
    auth: Arc<dyn Authenticator>,
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    trades: TradeBook,
    game: GameService,
    market: Arc<MarketEngine>,
    weather: Arc<WeatherEngine>,
    events: EventBus,
}

impl Coordinator {
    pub fn new(ctx: Arc<SimContext>, auth: Arc<dyn Authenticator>) -> Self {
        let events = EventBus::default();
        Self {
            rooms: RoomRegistry::new(ctx.config.room_capacity),
            sessions: SessionRegistry::default(),
            trades: TradeBook::default(),
            game: GameService::new(ctx.clone(), events.clone()),
            market: Arc::new(MarketEngine::new(ctx.clone(), events.clone())),
            weather: Arc::new(WeatherEngine::new(ctx.clone(), events.clone())),
            auth,
            events,
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<SimContext> {
        &self.ctx
    }

    /// Domain events for the notification dispatcher
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn game(&self) -> &GameService {
        &self.game
    }

    pub fn market(&self) -> &MarketEngine {
        &self.market
    }

    pub fn weather(&self) -> &WeatherEngine {
        &self.weather
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn trades(&self) -> &TradeBook {
        &self.trades
    }

    // ---- connection lifecycle ----

    pub fn connect(&self, conn: Arc<dyn Connection>) {
        debug!(conn = %conn.id(), addr = ?conn.remote_addr(), "connection opened");
        self.sessions.register(conn, self.ctx.now());
    }

    /// Remove a connection and its room membership
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some(session) = self.sessions.remove(conn) else {
            return;
        };
        if let Some(room) = session.state.room() {
            if let Err(err) = self.rooms.leave(room, conn).await {
                warn!(conn = %conn, room = %room, error = %err, "leave on disconnect failed");
            }
        }
        match session.state.player() {
            Some(player) => info!(conn = %conn, player = %player, "player disconnected"),
            None => debug!(conn = %conn, "connection closed"),
        }
    }

    /// Decode one wire line and handle it
    pub async fn handle_line(&self, conn: ConnectionId, line: &str) {
        match decode_line::<ClientMessage>(line) {
            Ok(message) => self.handle(conn, message).await,
            Err(err) => {
                if let Ok(session) = self.sessions.get(conn) {
                    self.sessions.touch(conn, self.ctx.now());
                    self.report(&session.conn, "decode", err.into());
                }
            }
        }
    }

    pub async fn handle(&self, conn: ConnectionId, message: ClientMessage) {
        let Ok(session) = self.sessions.get(conn) else {
            debug!(conn = %conn, "message from unknown connection");
            return;
        };
        self.sessions.touch(conn, self.ctx.now());
        let kind = message.kind();
        debug!(conn = %conn, kind, "inbound");
        if let Err(err) = self.dispatch(&session.conn, message).await {
            self.report(&session.conn, kind, err);
        }
    }

    fn report(&self, conn: &Arc<dyn Connection>, kind: &str, err: Error) {
        let player = self.sessions.player(conn.id()).ok();
        if err.is_ownership() {
            warn!(conn = %conn.id(), ?player, kind, error = %err, "ownership rejected");
        } else if err.is_transient() {
            error!(conn = %conn.id(), ?player, kind, error = %err, "action failed");
        } else {
            debug!(conn = %conn.id(), ?player, kind, error = %err, "action rejected");
        }
        let _ = conn.send(ServerMessage::error(err.client_message()));
    }

    fn notify(&self, player: PlayerId, message: ServerMessage) {
        if let Some(conn) = self.sessions.connection_for(player) {
            if let Err(err) = conn.send(message) {
                debug!(player = %player, error = %err, "notification dropped");
            }
        }
    }

    async fn dispatch(&self, conn: &Arc<dyn Connection>, message: ClientMessage) -> Result<()> {
        let id = conn.id();
        match message {
            ClientMessage::Auth { token } => self.authenticate(conn, &token),
            ClientMessage::JoinRoom { room_id } => self.join_room(conn, room_id).await,
            ClientMessage::LeaveRoom { room_id } => {
                let (_, room) = self.sessions.membership(id)?;
                if room != room_id {
                    return Err(Error::WrongRoom(room_id));
                }
                self.rooms.leave(&room, id).await?;
                self.sessions.exit_room(id);
                conn.send(ServerMessage::RoomLeft { room_id: room })?;
                Ok(())
            }
            ClientMessage::PlantAction { action, plant_id } => {
                let (player, room) = self.sessions.membership(id)?;
                let outcome = self.game.plant_action(player, action, plant_id).await?;
                self.rooms.broadcast(
                    &room,
                    ServerMessage::PlantActionResult {
                        player_id: player,
                        action,
                        plant: outcome.plant,
                        growth_gained: outcome.growth_gained,
                        harvest_weight: outcome.harvest_weight,
                        recommendations: outcome.recommendations,
                    },
                    None,
                );
                Ok(())
            }
            ClientMessage::PlantSeed {
                genetics_id,
                location_id,
            } => {
                let (player, room) = self.sessions.membership(id)?;
                let plant = self.game.plant_seed(player, genetics_id, location_id)?;
                self.rooms.broadcast(
                    &room,
                    ServerMessage::PlantSeeded {
                        player_id: player,
                        plant,
                    },
                    None,
                );
                Ok(())
            }
            ClientMessage::SellHarvest { plant_id } => {
                let player = self.sessions.player(id)?;
                let sale = self.game.sell(player, plant_id).await?;
                conn.send(ServerMessage::SaleCompleted {
                    plant_id,
                    price: sale.record.price,
                    tokens: sale.player.tokens,
                })?;
                Ok(())
            }
            ClientMessage::TradeRequest { target_id, items } => {
                let (player, _) = self.sessions.membership(id)?;
                self.open_trade(conn, player, target_id, items)
            }
            ClientMessage::TradeResponse { trade_id, accept } => {
                let player = self.sessions.player(id)?;
                if accept {
                    self.accept_trade(player, trade_id).await
                } else {
                    self.resolve_trade(trade_id, |offer, now| offer.decline(player, now))
                        .await
                }
            }
            ClientMessage::TradeCancel { trade_id } => {
                let player = self.sessions.player(id)?;
                self.resolve_trade(trade_id, |offer, now| offer.cancel(player, now))
                    .await
            }
            ClientMessage::ShareGenetics { genetics_id } => {
                let (player, room) = self.sessions.membership(id)?;
                let genetics = self.game.share(player, genetics_id)?;
                self.rooms.broadcast(
                    &room,
                    ServerMessage::GeneticsShared {
                        player_id: player,
                        genetics,
                    },
                    None,
                );
                Ok(())
            }
            ClientMessage::MarketUpdateRequest => {
                self.sessions.membership(id)?;
                conn.send(ServerMessage::MarketPricesUpdate(self.market.snapshot()))?;
                Ok(())
            }
            ClientMessage::WeatherSyncRequest => {
                self.sessions.membership(id)?;
                conn.send(ServerMessage::WeatherUpdate(self.weather.snapshot()))?;
                Ok(())
            }
            ClientMessage::BreedRequest {
                parent1_id,
                parent2_id,
            } => self.breed(conn, parent1_id, parent2_id).await,
            ClientMessage::PlantStatusRequest { plant_id } => {
                let player = self.sessions.player(id)?;
                let (plant, inspection) = self.game.plant_status(player, plant_id)?;
                conn.send(ServerMessage::PlantStatus { plant, inspection })?;
                Ok(())
            }
            ClientMessage::PriceHistoryRequest {
                genetics_id,
                location_id,
                days,
            } => {
                self.sessions.player(id)?;
                let (points, trend) = self.market.price_history(genetics_id, location_id, days)?;
                conn.send(ServerMessage::PriceHistory {
                    genetics_id,
                    location_id,
                    points,
                    trend,
                })?;
                Ok(())
            }
            ClientMessage::BreedingHistoryRequest => {
                let player = self.sessions.player(id)?;
                let (breeder, records) = self.game.breeding_history(player)?;
                let attempts = records
                    .into_iter()
                    .map(|r| BreedingAttempt {
                        parent1_id: r.parent1,
                        parent2_id: r.parent2,
                        offspring_id: r.offspring,
                        rarity: r.rarity,
                        success_probability: r.success_probability,
                        at: r.created_at,
                    })
                    .collect();
                conn.send(ServerMessage::BreedingHistory {
                    lab_level: breeder.lab_level(),
                    strains_bred: breeder.strains_bred,
                    attempts,
                })?;
                Ok(())
            }
            ClientMessage::Pong => Ok(()),
        }
    }

    fn authenticate(&self, conn: &Arc<dyn Connection>, token: &str) -> Result<()> {
        if self.sessions.player(conn.id()).is_ok() {
            return Err(Error::AlreadyAuthenticated);
        }
        let player_id = self.auth.verify(token).ok_or(Error::InvalidCredentials)?;
        let player = self
            .game
            .ensure_player(player_id, &self.auth.display_name(player_id))?;
        self.sessions.authenticate(conn.id(), player_id)?;
        info!(conn = %conn.id(), player = %player_id, "authenticated");
        conn.send(ServerMessage::Authenticated {
            player_id,
            level: player.level,
            lab_level: player.lab_level(),
            name: player.name,
            tokens: player.tokens,
        })?;
        Ok(())
    }

    async fn join_room(&self, conn: &Arc<dyn Connection>, room_id: RoomId) -> Result<()> {
        let id = conn.id();
        let session = self.sessions.get(id)?;
        let player = session.state.player().ok_or(Error::NotAuthenticated)?;

        let previous = session.state.room().filter(|r| **r != room_id).cloned();
        if let Some(current) = &previous {
            self.rooms.leave(current, id).await?;
            self.sessions.exit_room(id);
            conn.send(ServerMessage::RoomLeft {
                room_id: current.clone(),
            })?;
        }

        // The room task sends `room_joined` to the joiner itself
        if let Err(err) = self.rooms.join(&room_id, player, conn.clone()).await {
            if let Some(current) = previous {
                self.rejoin(conn, player, current).await;
            }
            return Err(err);
        }
        self.sessions.enter_room(id, room_id)
    }

    /// Put a player back in the room they left for a join that failed
    async fn rejoin(&self, conn: &Arc<dyn Connection>, player: PlayerId, room: RoomId) {
        match self.rooms.join(&room, player, conn.clone()).await {
            Ok(_) => {
                if let Err(err) = self.sessions.enter_room(conn.id(), room.clone()) {
                    warn!(conn = %conn.id(), room = %room, error = %err, "rejoin not recorded");
                }
            }
            Err(err) => {
                warn!(conn = %conn.id(), room = %room, error = %err, "could not rejoin previous room");
            }
        }
    }

    async fn breed(
        &self,
        conn: &Arc<dyn Connection>,
        parent1_id: GeneticsId,
        parent2_id: GeneticsId,
    ) -> Result<()> {
        let session = self.sessions.get(conn.id())?;
        let player = session.state.player().ok_or(Error::NotAuthenticated)?;
        let bred = self.game.breed(player, parent1_id, parent2_id).await?;

        match bred.outcome {
            BreedOutcome::Success {
                offspring,
                success_probability,
                ..
            } => {
                let message = ServerMessage::GeneticsBred {
                    player_id: player,
                    genetics: *offspring,
                    success_probability,
                };
                match session.state.room() {
                    Some(room) => self.rooms.broadcast(room, message, None),
                    None => conn.send(message)?,
                }
            }
            BreedOutcome::Failure {
                success_probability,
                roll,
            } => {
                debug!(player = %player, success_probability, roll, "breeding roll missed");
                conn.send(ServerMessage::BreedFailed {
                    parent1_id,
                    parent2_id,
                    success_probability,
                    roll,
                })?;
            }
        }
        Ok(())
    }

    // ---- trades ----

    /// The initiator must hold everything they offer when the offer is made;
    /// settlement checks both sides again.
    fn check_offerable(&self, player: PlayerId, items: &TradeItems) -> Result<()> {
        let store = &self.ctx.store;
        for item in &items.offered {
            match *item {
                TradeItem::Genetics(genetics) => {
                    if !store.owns(player, genetics)? {
                        return Err(
                            growroom_core::Error::ownership("genetics", genetics, player).into(),
                        );
                    }
                }
                TradeItem::Plant(plant) => {
                    if store.plant(plant)?.owner != player {
                        return Err(growroom_core::Error::ownership("plant", plant, player).into());
                    }
                }
                TradeItem::Tokens(_) => {}
            }
        }
        let balance = store.player(player)?.tokens;
        if balance < items.tokens_offered() {
            return Err(growroom_core::Error::validation(format!(
                "offer needs {} tokens, {} has {}",
                items.tokens_offered(),
                player,
                balance
            ))
            .into());
        }
        Ok(())
    }

    fn open_trade(
        &self,
        conn: &Arc<dyn Connection>,
        player: PlayerId,
        target: PlayerId,
        items: TradeItems,
    ) -> Result<()> {
        let now = self.ctx.now();
        if player == target {
            return Err(growroom_core::Error::validation("cannot trade with yourself").into());
        }
        let target_conn = self.sessions.connection_for(target).ok_or_else(|| {
            growroom_core::Error::validation(format!("{} is not online", target))
        })?;
        items.validate()?;
        self.check_offerable(player, &items)?;

        let id = TradeId(self.ctx.store.next_id(sequence::TRADE)?);
        let offer = TradeOffer::new(
            id,
            player,
            target,
            items,
            self.ctx.config.trade_ttl(),
            now,
        )?;
        self.trades.open(offer.clone());
        info!(trade = %id, from = %player, to = %target, "trade offered");

        if let Err(err) = target_conn.send(ServerMessage::TradeRequest {
            trade: offer.clone(),
        }) {
            debug!(trade = %id, error = %err, "trade request not delivered");
        }
        conn.send(ServerMessage::TradeRequestSent { trade: offer })?;
        Ok(())
    }

    async fn accept_trade(&self, player: PlayerId, trade: TradeId) -> Result<()> {
        let _guard = self.ctx.locks.lock(LockKey::Trade(trade)).await;
        let mut offer = self.trades.get(trade)?;
        let now = self.ctx.now();

        if let Err(err) = offer.check_acceptable(player, now) {
            if offer.status == TradeStatus::Expired {
                self.trades.close(trade);
                self.announce_expired(&offer);
            }
            return Err(err.into());
        }
        offer.mark_accepted(now);

        match self.ctx.store.settle_trade(&offer, now) {
            Ok(_record) => {
                self.trades.close(trade);
                info!(trade = %trade, "trade settled");
                self.announce_resolved(&offer, TradeStatus::Accepted);
                self.events.publish(DomainEvent::TradeCompleted {
                    trade,
                    initiator: offer.initiator,
                    target: offer.target,
                    at: now,
                });
                Ok(())
            }
            Err(err) => {
                let err = Error::from(err);
                // Transient failures leave the offer open for another try
                if !err.is_transient() {
                    self.trades.close(trade);
                    self.announce_resolved(&offer, TradeStatus::Cancelled);
                }
                Err(err)
            }
        }
    }

    /// Decline or cancel an open offer
    async fn resolve_trade(
        &self,
        trade: TradeId,
        resolve: impl FnOnce(&mut TradeOffer, chrono::DateTime<chrono::Utc>) -> growroom_core::Result<()>,
    ) -> Result<()> {
        let _guard = self.ctx.locks.lock(LockKey::Trade(trade)).await;
        let mut offer = self.trades.get(trade)?;
        if let Err(err) = resolve(&mut offer, self.ctx.now()) {
            if offer.status == TradeStatus::Expired {
                self.trades.close(trade);
                self.announce_expired(&offer);
            }
            return Err(err.into());
        }
        self.trades.close(trade);
        info!(trade = %trade, status = %offer.status, "trade resolved");
        self.announce_resolved(&offer, offer.status);
        Ok(())
    }

    fn announce_resolved(&self, offer: &TradeOffer, status: TradeStatus) {
        for player in [offer.initiator, offer.target] {
            self.notify(
                player,
                ServerMessage::TradeResolved {
                    trade_id: offer.id,
                    status,
                },
            );
        }
    }

    fn announce_expired(&self, offer: &TradeOffer) {
        info!(trade = %offer.id, "trade expired");
        for player in [offer.initiator, offer.target] {
            self.notify(player, ServerMessage::TradeExpired { trade_id: offer.id });
        }
    }

    /// Expire offers past their TTL; returns how many
    ///
    /// Each offer is expired under its trade lock, so an accept that is
    /// already settling finishes first and the offer is then gone.
    pub async fn expire_trades(&self) -> usize {
        let now = self.ctx.now();
        let mut expired = 0;
        for trade in self.trades.due(now) {
            let _guard = self.ctx.locks.lock(LockKey::Trade(trade)).await;
            let Ok(mut offer) = self.trades.get(trade) else {
                continue;
            };
            if offer.expire_if_due(now) {
                self.trades.close(trade);
                self.announce_expired(&offer);
                expired += 1;
            }
        }
        expired
    }

    // ---- background work ----

    /// Drop silent connections, then ping the rest; returns how many dropped
    pub async fn heartbeat_sweep(&self) -> usize {
        let now = self.ctx.now();
        let stale = self
            .sessions
            .stale(now, self.ctx.config.heartbeat_timeout());
        for conn in &stale {
            if let Ok(session) = self.sessions.get(*conn) {
                session.conn.close();
            }
            info!(conn = %conn, "heartbeat timeout");
            self.disconnect(*conn).await;
        }

        let mut dead = Vec::new();
        for conn in self.sessions.connections() {
            let ping = ServerMessage::Ping {
                timestamp: now.timestamp_millis(),
            };
            if !conn.is_connected() || conn.send(ping).is_err() {
                dead.push(conn.id());
            }
        }
        for conn in &dead {
            self.disconnect(*conn).await;
        }
        stale.len() + dead.len()
    }

    pub async fn market_tick(&self) -> Result<()> {
        let snapshot = run_with_retry("market_tick", self.ctx.config.retry_policy(), || {
            let market = self.market.clone();
            blocking("market_tick", move || market.tick())
        })
        .await?;
        self.rooms
            .broadcast_all(ServerMessage::MarketPricesUpdate(snapshot));
        Ok(())
    }

    pub async fn weather_tick(&self) -> Result<()> {
        let snapshot = run_with_retry("weather_tick", self.ctx.config.retry_policy(), || {
            let weather = self.weather.clone();
            blocking("weather_tick", move || weather.tick())
        })
        .await?;
        self.rooms.broadcast_all(ServerMessage::WeatherUpdate(snapshot));
        Ok(())
    }

    /// Start the market, weather, heartbeat and trade-expiry schedulers
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let config = &self.ctx.config;
        let market = self.clone();
        let weather = self.clone();
        let heartbeat = self.clone();
        let trades = self.clone();
        vec![
            spawn_periodic("market_tick", config.market_tick(), move || {
                let hub = market.clone();
                async move {
                    if let Err(err) = hub.market_tick().await {
                        warn!(error = %err, "market tick skipped, keeping last snapshot");
                    }
                }
            }),
            spawn_periodic("weather_tick", config.weather_tick(), move || {
                let hub = weather.clone();
                async move {
                    if let Err(err) = hub.weather_tick().await {
                        warn!(error = %err, "weather tick skipped, keeping last snapshot");
                    }
                }
            }),
            spawn_periodic(
                "heartbeat",
                config.heartbeat_interval(),
                move || {
                    let hub = heartbeat.clone();
                    async move {
                        hub.heartbeat_sweep().await;
                    }
                },
            ),
            spawn_periodic("trade_expiry", config.trade_sweep(), move || {
                let hub = trades.clone();
                async move {
                    let expired = hub.expire_trades().await;
                    if expired > 0 {
                        debug!(expired, "trade sweep");
                    }
                }
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StaticTokens, TokenEntry};
    use crate::config::CoordinatorConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use growroom_core::{GameRng, GrowingLocation, LocationId, ManualClock, PlantId};
    use growroom_db::Store;
    use growroom_net::{ChannelConnection, Outbound, PlantActionKind};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 18, 0, 0).unwrap()
    }

    struct Harness {
        hub: Arc<Coordinator>,
        clock: Arc<ManualClock>,
    }

    struct Client {
        id: ConnectionId,
        rx: UnboundedReceiver<Outbound>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                if let Outbound::Message(message) = item {
                    out.push(message);
                }
            }
            out
        }

        fn last_error(&mut self) -> Option<String> {
            self.drain().into_iter().rev().find_map(|m| match m {
                ServerMessage::Error { message } => Some(message),
                _ => None,
            })
        }
    }

    fn harness(config: CoordinatorConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .save_location(&GrowingLocation {
                id: LocationId(1),
                name: "Valley".into(),
                market_modifier: 1.0,
                is_active: true,
            })
            .unwrap();
        let ctx = Arc::new(SimContext::new(store, clock.clone(), GameRng::new(21), config));
        let auth = StaticTokens::new((1..=4).map(|n| TokenEntry {
            token: format!("token-{}", n),
            player: PlayerId(n),
            name: format!("Grower {}", n),
        }));
        Harness {
            hub: Arc::new(Coordinator::new(ctx, Arc::new(auth))),
            clock,
        }
    }

    impl Harness {
        fn connect(&self, id: u64) -> Client {
            let (conn, rx) = ChannelConnection::new(ConnectionId(id), None);
            self.hub.connect(Arc::new(conn));
            Client {
                id: ConnectionId(id),
                rx,
            }
        }

        async fn send(&self, client: &Client, message: ClientMessage) {
            self.hub.handle(client.id, message).await;
        }

        /// Connect, authenticate as player `n` and join `room`
        async fn player_in(&self, n: u64, room: &str) -> Client {
            let mut client = self.connect(n);
            self.send(
                &client,
                ClientMessage::Auth {
                    token: format!("token-{}", n),
                },
            )
            .await;
            self.send(
                &client,
                ClientMessage::JoinRoom {
                    room_id: RoomId::new(room),
                },
            )
            .await;
            // Round trip through the room task so the join has settled
            self.hub.rooms.count(&RoomId::new(room)).await;
            client.drain();
            client
        }

        fn starters(&self, player: u64) -> Vec<GeneticsId> {
            let mut ids: Vec<GeneticsId> = self
                .hub
                .ctx
                .store
                .owned_genetics(PlayerId(player))
                .unwrap()
                .into_iter()
                .map(|o| o.genetics)
                .collect();
            ids.sort();
            ids
        }
    }

    async fn settle(hub: &Coordinator, room: &str) {
        hub.rooms.count(&RoomId::new(room)).await;
    }

    #[tokio::test]
    async fn test_room_actions_need_authentication_then_membership() {
        let h = harness(CoordinatorConfig::default());
        let mut client = h.connect(1);

        h.send(&client, ClientMessage::MarketUpdateRequest).await;
        assert_eq!(client.last_error().unwrap(), "Not authenticated");

        h.send(
            &client,
            ClientMessage::Auth {
                token: "wrong".into(),
            },
        )
        .await;
        assert_eq!(client.last_error().unwrap(), "Invalid credentials");

        h.send(
            &client,
            ClientMessage::Auth {
                token: "token-1".into(),
            },
        )
        .await;
        let messages = client.drain();
        assert!(matches!(
            &messages[0],
            ServerMessage::Authenticated { player_id: PlayerId(1), name, tokens: 500, .. }
                if name == "Grower 1"
        ));

        h.send(&client, ClientMessage::WeatherSyncRequest).await;
        assert_eq!(client.last_error().unwrap(), "Join a room first");

        h.send(
            &client,
            ClientMessage::JoinRoom {
                room_id: RoomId::new("global"),
            },
        )
        .await;
        settle(&h.hub, "global").await;
        h.send(&client, ClientMessage::WeatherSyncRequest).await;
        let messages = client.drain();
        assert!(matches!(
            messages[0],
            ServerMessage::RoomJoined { players_count: 1, .. }
        ));
        assert!(matches!(messages[1], ServerMessage::WeatherUpdate(_)));
    }

    #[tokio::test]
    async fn test_member_counts_follow_joins_and_disconnects() {
        let h = harness(CoordinatorConfig::default());
        let mut first = h.player_in(1, "lobby").await;
        let mut second = h.player_in(2, "lobby").await;

        assert!(first.drain().contains(&ServerMessage::PlayerJoined {
            room_id: RoomId::new("lobby"),
            player_id: PlayerId(2),
            players_count: 2,
        }));

        h.hub.disconnect(second.id).await;
        settle(&h.hub, "lobby").await;
        assert!(first.drain().contains(&ServerMessage::PlayerLeft {
            room_id: RoomId::new("lobby"),
            player_id: PlayerId(2),
            players_count: 1,
        }));
        assert!(second.drain().is_empty());
        assert_eq!(h.hub.rooms.count(&RoomId::new("lobby")).await, 1);
    }

    #[tokio::test]
    async fn test_join_moves_between_rooms() {
        let h = harness(CoordinatorConfig::default());
        let mut client = h.player_in(1, "north").await;
        h.send(
            &client,
            ClientMessage::JoinRoom {
                room_id: RoomId::new("south"),
            },
        )
        .await;
        settle(&h.hub, "south").await;

        let messages = client.drain();
        assert_eq!(
            messages[0],
            ServerMessage::RoomLeft {
                room_id: RoomId::new("north")
            }
        );
        assert_eq!(h.hub.rooms.count(&RoomId::new("north")).await, 0);
        assert_eq!(h.hub.rooms.count(&RoomId::new("south")).await, 1);
        assert_eq!(
            h.hub.sessions.membership(client.id).unwrap().1,
            RoomId::new("south")
        );
    }

    #[tokio::test]
    async fn test_full_room_rejects_join() {
        let config = CoordinatorConfig {
            room_capacity: 1,
            ..CoordinatorConfig::default()
        };
        let h = harness(config);
        let _first = h.player_in(1, "tiny").await;
        let mut second = h.player_in(2, "tiny").await;
        // player_in drained the error; ask again
        h.send(
            &second,
            ClientMessage::JoinRoom {
                room_id: RoomId::new("tiny"),
            },
        )
        .await;
        assert!(second.last_error().unwrap().contains("full"));
        assert!(matches!(
            h.hub.sessions.membership(second.id),
            Err(Error::NotInRoom)
        ));
    }

    #[tokio::test]
    async fn test_plant_results_reach_the_room() {
        let h = harness(CoordinatorConfig::default());
        let mut grower = h.player_in(1, "farm").await;
        let mut watcher = h.player_in(2, "farm").await;
        grower.drain();
        let strain = h.starters(1)[0];

        h.send(
            &grower,
            ClientMessage::PlantSeed {
                genetics_id: strain,
                location_id: LocationId(1),
            },
        )
        .await;
        settle(&h.hub, "farm").await;
        let seeded = watcher.drain();
        let plant_id = match &seeded[..] {
            [ServerMessage::PlantSeeded { player_id, plant }] => {
                assert_eq!(*player_id, PlayerId(1));
                plant.id
            }
            other => panic!("unexpected {:?}", other),
        };
        grower.drain();

        h.clock.advance(Duration::hours(6));
        h.send(
            &grower,
            ClientMessage::PlantAction {
                action: PlantActionKind::Advance,
                plant_id,
            },
        )
        .await;
        settle(&h.hub, "farm").await;
        for client in [&mut grower, &mut watcher] {
            let messages = client.drain();
            assert!(matches!(
                &messages[..],
                [ServerMessage::PlantActionResult { growth_gained: Some(g), .. }] if *g > 0.0
            ));
        }

        // Someone else's plant
        h.send(
            &watcher,
            ClientMessage::PlantAction {
                action: PlantActionKind::Water,
                plant_id,
            },
        )
        .await;
        assert_eq!(
            watcher.last_error().unwrap(),
            format!("plant {} is not owned by {}", plant_id, PlayerId(2))
        );

        h.send(
            &grower,
            ClientMessage::PlantAction {
                action: PlantActionKind::Water,
                plant_id: PlantId(999),
            },
        )
        .await;
        assert!(grower.last_error().is_some());
    }

    #[tokio::test]
    async fn test_trade_offer_accept_moves_items() {
        let h = harness(CoordinatorConfig::default());
        let mut alice = h.player_in(1, "market").await;
        let mut bob = h.player_in(2, "market").await;
        let mut carol = h.player_in(3, "market").await;
        alice.drain();
        bob.drain();
        let offered = h.starters(1)[0];

        h.send(
            &alice,
            ClientMessage::TradeRequest {
                target_id: PlayerId(2),
                items: TradeItems {
                    offered: vec![TradeItem::Genetics(offered)],
                    requested: vec![TradeItem::Tokens(100)],
                },
            },
        )
        .await;

        let trade_id = match &alice.drain()[..] {
            [ServerMessage::TradeRequestSent { trade }] => trade.id,
            other => panic!("unexpected {:?}", other),
        };
        assert!(matches!(
            &bob.drain()[..],
            [ServerMessage::TradeRequest { trade }] if trade.id == trade_id
        ));
        settle(&h.hub, "market").await;
        assert!(carol.drain().is_empty());

        // Only the target may accept
        h.send(
            &alice,
            ClientMessage::TradeResponse {
                trade_id,
                accept: true,
            },
        )
        .await;
        assert!(alice.last_error().is_some());

        h.send(
            &bob,
            ClientMessage::TradeResponse {
                trade_id,
                accept: true,
            },
        )
        .await;
        let resolved = ServerMessage::TradeResolved {
            trade_id,
            status: TradeStatus::Accepted,
        };
        assert_eq!(alice.drain(), vec![resolved.clone()]);
        assert_eq!(bob.drain(), vec![resolved]);

        let store = &h.hub.ctx.store;
        assert!(store.owns(PlayerId(2), offered).unwrap());
        assert!(!store.owns(PlayerId(1), offered).unwrap());
        assert_eq!(store.player(PlayerId(1)).unwrap().tokens, 600);
        assert_eq!(store.player(PlayerId(2)).unwrap().tokens, 400);
        assert_eq!(store.trade_records().unwrap().len(), 1);
        assert!(h.hub.trades.is_empty());
    }

    #[tokio::test]
    async fn test_trade_expires_after_ttl() {
        let h = harness(CoordinatorConfig::default());
        let mut alice = h.player_in(1, "market").await;
        let mut bob = h.player_in(2, "market").await;
        alice.drain();

        h.send(
            &alice,
            ClientMessage::TradeRequest {
                target_id: PlayerId(2),
                items: TradeItems {
                    offered: vec![TradeItem::Tokens(50)],
                    requested: vec![],
                },
            },
        )
        .await;
        let trade_id = match &alice.drain()[..] {
            [ServerMessage::TradeRequestSent { trade }] => trade.id,
            other => panic!("unexpected {:?}", other),
        };
        bob.drain();

        h.clock.advance(Duration::minutes(14));
        assert_eq!(h.hub.expire_trades().await, 0);
        h.clock.advance(Duration::minutes(1));

        // Accepting at the deadline is too late
        h.send(
            &bob,
            ClientMessage::TradeResponse {
                trade_id,
                accept: true,
            },
        )
        .await;
        let messages = bob.drain();
        assert!(messages.contains(&ServerMessage::TradeExpired { trade_id }));
        assert!(matches!(messages.last(), Some(ServerMessage::Error { .. })));
        assert!(alice.drain().contains(&ServerMessage::TradeExpired { trade_id }));

        assert_eq!(h.hub.expire_trades().await, 0);
        assert_eq!(
            h.hub.ctx.store.player(PlayerId(2)).unwrap().tokens,
            growroom_core::player::STARTING_TOKENS
        );
    }

    async fn offer_tokens(h: &Harness, alice: &mut Client, bob: &mut Client) -> TradeId {
        h.send(
            alice,
            ClientMessage::TradeRequest {
                target_id: PlayerId(2),
                items: TradeItems {
                    offered: vec![TradeItem::Tokens(50)],
                    requested: vec![],
                },
            },
        )
        .await;
        let trade_id = match &alice.drain()[..] {
            [ServerMessage::TradeRequestSent { trade }] => trade.id,
            other => panic!("unexpected {:?}", other),
        };
        bob.drain();
        trade_id
    }

    #[tokio::test]
    async fn test_expiry_sweep_waits_for_trade_lock() {
        let h = harness(CoordinatorConfig::default());
        let mut alice = h.player_in(1, "market").await;
        let mut bob = h.player_in(2, "market").await;
        alice.drain();
        let settled = offer_tokens(&h, &mut alice, &mut bob).await;
        let abandoned = offer_tokens(&h, &mut alice, &mut bob).await;
        h.clock.advance(Duration::minutes(15));

        // An accept for `settled` is mid-settlement and holds its lock
        let guard = h.hub.ctx.locks.lock(LockKey::Trade(settled)).await;
        let hub = h.hub.clone();
        let sweep = tokio::spawn(async move { hub.expire_trades().await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!sweep.is_finished());
        assert!(h.hub.trades.get(settled).is_ok());
        assert!(alice.drain().is_empty());

        // The accept finishes and takes the offer out of the book
        h.hub.trades.close(settled);
        drop(guard);
        assert_eq!(sweep.await.unwrap(), 1);

        let notices = alice.drain();
        assert!(!notices.contains(&ServerMessage::TradeExpired { trade_id: settled }));
        assert!(notices.contains(&ServerMessage::TradeExpired { trade_id: abandoned }));
        assert!(h.hub.trades.is_empty());
    }

    #[tokio::test]
    async fn test_full_target_room_keeps_player_in_old_room() {
        let config = CoordinatorConfig {
            room_capacity: 1,
            ..CoordinatorConfig::default()
        };
        let h = harness(config);
        let _first = h.player_in(1, "tiny").await;
        let mut second = h.player_in(2, "home").await;

        h.send(
            &second,
            ClientMessage::JoinRoom {
                room_id: RoomId::new("tiny"),
            },
        )
        .await;
        settle(&h.hub, "home").await;
        assert!(second.last_error().unwrap().contains("full"));
        assert_eq!(
            h.hub.sessions.membership(second.id).unwrap().1,
            RoomId::new("home")
        );
        assert_eq!(h.hub.rooms.count(&RoomId::new("home")).await, 1);
        assert_eq!(h.hub.rooms.count(&RoomId::new("tiny")).await, 1);
    }

    #[tokio::test]
    async fn test_status_and_history_requests() {
        let h = harness(CoordinatorConfig::default());
        let mut grower = h.player_in(1, "lab").await;
        let parents = h.starters(1);

        h.send(
            &grower,
            ClientMessage::PlantSeed {
                genetics_id: parents[0],
                location_id: LocationId(1),
            },
        )
        .await;
        settle(&h.hub, "lab").await;
        let plant_id = match &grower.drain()[..] {
            [ServerMessage::PlantSeeded { plant, .. }] => plant.id,
            other => panic!("unexpected {:?}", other),
        };

        h.send(&grower, ClientMessage::PlantStatusRequest { plant_id }).await;
        match &grower.drain()[..] {
            [ServerMessage::PlantStatus { plant, inspection }] => {
                assert_eq!(plant.id, plant_id);
                assert_eq!(inspection.hours_to_harvest, plant.hours_to_harvest());
            }
            other => panic!("unexpected {:?}", other),
        }

        h.hub.market_tick().await.unwrap();
        settle(&h.hub, "lab").await;
        grower.drain();
        h.send(
            &grower,
            ClientMessage::PriceHistoryRequest {
                genetics_id: parents[0],
                location_id: None,
                days: 7,
            },
        )
        .await;
        match &grower.drain()[..] {
            [ServerMessage::PriceHistory { points, trend, .. }] => {
                assert_eq!(points.len(), 1);
                assert_eq!(trend.unwrap().change, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        h.send(
            &grower,
            ClientMessage::PriceHistoryRequest {
                genetics_id: parents[0],
                location_id: None,
                days: 0,
            },
        )
        .await;
        assert!(grower.last_error().is_some());

        for _ in 0..3 {
            h.send(
                &grower,
                ClientMessage::BreedRequest {
                    parent1_id: parents[0],
                    parent2_id: parents[1],
                },
            )
            .await;
        }
        settle(&h.hub, "lab").await;
        grower.drain();
        h.send(&grower, ClientMessage::BreedingHistoryRequest).await;
        match &grower.drain()[..] {
            [ServerMessage::BreedingHistory {
                lab_level,
                strains_bred,
                attempts,
            }] => {
                assert_eq!(*lab_level, 1);
                assert_eq!(attempts.len(), 3);
                let successes = attempts.iter().filter(|a| a.offspring_id.is_some()).count();
                assert_eq!(*strains_bred as usize, successes);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trade_needs_online_target() {
        let h = harness(CoordinatorConfig::default());
        let mut alice = h.player_in(1, "market").await;
        h.send(
            &alice,
            ClientMessage::TradeRequest {
                target_id: PlayerId(4),
                items: TradeItems {
                    offered: vec![TradeItem::Tokens(5)],
                    requested: vec![],
                },
            },
        )
        .await;
        assert_eq!(
            alice.last_error().unwrap(),
            "Invalid request: player:4 is not online"
        );
        assert!(h.hub.trades.is_empty());
    }

    #[tokio::test]
    async fn test_breed_request_reports_outcome() {
        let h = harness(CoordinatorConfig::default());
        let mut breeder = h.player_in(1, "lab").await;
        let parents = h.starters(1);

        for _ in 0..6 {
            h.send(
                &breeder,
                ClientMessage::BreedRequest {
                    parent1_id: parents[0],
                    parent2_id: parents[1],
                },
            )
            .await;
        }
        settle(&h.hub, "lab").await;
        let messages = breeder.drain();
        assert_eq!(messages.len(), 6);
        for message in &messages {
            match message {
                ServerMessage::GeneticsBred {
                    player_id,
                    genetics,
                    success_probability,
                } => {
                    assert_eq!(*player_id, PlayerId(1));
                    assert_eq!(genetics.generation, 1);
                    assert!((5.0..=85.0).contains(success_probability));
                }
                ServerMessage::BreedFailed {
                    success_probability,
                    roll,
                    ..
                } => assert!(roll > success_probability),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_heartbeat_drops_silent_connections() {
        let h = harness(CoordinatorConfig::default());
        let mut quiet = h.player_in(1, "global").await;
        let mut chatty = h.player_in(2, "global").await;
        quiet.drain();

        h.clock.advance(Duration::seconds(60));
        h.send(&chatty, ClientMessage::Pong).await;
        h.clock.advance(Duration::seconds(31));

        assert_eq!(h.hub.heartbeat_sweep().await, 1);
        settle(&h.hub, "global").await;
        assert!(h.hub.sessions.get(quiet.id).is_err());
        assert_eq!(h.hub.rooms.count(&RoomId::new("global")).await, 1);
        assert!(quiet.rx.try_recv().is_ok_and(|m| m == Outbound::Close));

        let messages = chatty.drain();
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::PlayerLeft { player_id: PlayerId(1), players_count: 1, .. }
        )));
        assert!(matches!(messages.last(), Some(ServerMessage::Ping { .. })));
    }

    #[tokio::test]
    async fn test_malformed_line_gets_error() {
        let h = harness(CoordinatorConfig::default());
        let mut client = h.connect(9);
        h.hub.handle_line(client.id, r#"{"type":"dance"}"#).await;
        assert!(client
            .last_error()
            .unwrap()
            .starts_with("Malformed message"));
    }

    #[tokio::test]
    async fn test_ticks_broadcast_snapshots() {
        let h = harness(CoordinatorConfig::default());
        let mut client = h.player_in(1, "global").await;
        h.hub.weather_tick().await.unwrap();
        h.hub.market_tick().await.unwrap();
        settle(&h.hub, "global").await;

        let messages = client.drain();
        assert!(matches!(&messages[0], ServerMessage::WeatherUpdate(w) if !w.active.is_empty()));
        assert!(matches!(
            &messages[1],
            ServerMessage::MarketPricesUpdate(m) if m.conditions.len() == h.starters(1).len()
        ));
    }
}
