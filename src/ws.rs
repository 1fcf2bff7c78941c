//! WebSocket transport for the Jarls game server.
//!
//! Mirrors the REST surface in `api.rs` so a client can drive a whole game
//! over one socket, plus a subscription channel for real-time `GameEvent`
//! pushes (including AI-generated moves, which have no REST caller to
//! piggyback a response on).
//!
//! ## Architecture
//!
//! - **`GameBroadcaster`** — a singleton actor holding per-game subscriber
//!   sets; forwards events to every subscribed session.
//! - **`WsSession`** — one actor per connection. Parses JSON commands,
//!   drives them through `GameManager`, and relays broadcaster pushes.
//!
//! ## Client -> Server protocol
//!
//! Every message carries an `"action"` field and an optional `"request_id"`
//! echoed back for correlation: `create_game`, `join`, `leave`, `start`,
//! `make_move`, `starvation_choice`, `disconnect`, `reconnect`, `add_ai`,
//! `subscribe`, `unsubscribe`, `get_game`, `list_games`, `delete_game`,
//! `get_stats`.
//!
//! ## Server -> Client protocol
//!
//! Responses: `{"type":"response","action":...,"request_id":...,"success":bool,"data"|"error":...}`.
//! Pushed events: `{"type":"event","game_id":...,"events":[GameEvent, ...]}`.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api::AppState;
use crate::types::{GameConfig, GameEvent, MoveCommand, PieceId, PlayerId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub addr: Addr<WsSession>,
    pub session_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub session_id: Uuid,
    pub game_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub session_id: Uuid,
    pub game_id: Uuid,
}

/// Pushed to every session subscribed to `game_id` whenever the manager
/// produces events for that game, whether triggered by a human request or
/// by the AI scheduler acting on its own.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct BroadcastEvent {
    pub game_id: Uuid,
    pub events: Vec<GameEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct WsText(pub String);

/// Singleton actor tracking WebSocket sessions and their game subscriptions.
#[derive(Default)]
pub struct GameBroadcaster {
    sessions: HashMap<Uuid, Addr<WsSession>>,
    subscriptions: HashMap<Uuid, HashSet<Uuid>>,
}

impl GameBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for GameBroadcaster {
    type Context = Context<Self>;
}

impl Handler<Connect> for GameBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>) {
        log::debug!("ws session {} connected", msg.session_id);
        self.sessions.insert(msg.session_id, msg.addr);
    }
}

impl Handler<Disconnect> for GameBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Context<Self>) {
        log::debug!("ws session {} disconnected", msg.session_id);
        self.sessions.remove(&msg.session_id);
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(&msg.session_id);
        }
        self.subscriptions.retain(|_, subs| !subs.is_empty());
    }
}

impl Handler<Subscribe> for GameBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self>) {
        self.subscriptions.entry(msg.game_id).or_default().insert(msg.session_id);
    }
}

impl Handler<Unsubscribe> for GameBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Context<Self>) {
        if let Some(subscribers) = self.subscriptions.get_mut(&msg.game_id) {
            subscribers.remove(&msg.session_id);
            if subscribers.is_empty() {
                self.subscriptions.remove(&msg.game_id);
            }
        }
    }
}

impl Handler<BroadcastEvent> for GameBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: BroadcastEvent, _ctx: &mut Context<Self>) {
        if msg.events.is_empty() {
            return;
        }
        if let Some(subscribers) = self.subscriptions.get(&msg.game_id) {
            let payload = serde_json::json!({
                "type": "event",
                "game_id": msg.game_id,
                "events": msg.events,
            })
            .to_string();
            for session_id in subscribers {
                if let Some(addr) = self.sessions.get(session_id) {
                    addr.do_send(WsText(payload.clone()));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsClientMessage {
    action: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    game_id: Option<Uuid>,
    #[serde(default)]
    config: Option<GameConfig>,
    #[serde(default)]
    player_id: Option<PlayerId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    command: Option<MoveCommand>,
    #[serde(default)]
    turn_number: Option<u64>,
    #[serde(default)]
    piece_id: Option<PieceId>,
    #[serde(default)]
    difficulty: Option<String>,
}

fn build_response(action: &str, request_id: &Option<String>, data: serde_json::Value) -> String {
    serde_json::json!({
        "type": "response",
        "action": action,
        "request_id": request_id,
        "success": true,
        "data": data,
    })
    .to_string()
}

fn build_error(action: &str, request_id: &Option<String>, error: impl ToString) -> String {
    serde_json::json!({
        "type": "response",
        "action": action,
        "request_id": request_id,
        "success": false,
        "error": error.to_string(),
    })
    .to_string()
}

fn missing_field(action: &str, request_id: &Option<String>, field: &str) -> String {
    build_error(action, request_id, format!("missing field: {field}"))
}

pub struct WsSession {
    id: Uuid,
    last_heartbeat: Instant,
    app_state: web::Data<AppState>,
    broadcaster: Addr<GameBroadcaster>,
}

impl WsSession {
    pub fn new(app_state: web::Data<AppState>, broadcaster: Addr<GameBroadcaster>) -> Self {
        Self { id: Uuid::new_v4(), last_heartbeat: Instant::now(), app_state, broadcaster }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::warn!("ws session {} heartbeat timeout", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        let msg: WsClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                ctx.text(build_error("unknown", &None, format!("invalid JSON: {e}")));
                return;
            }
        };

        let manager = self.app_state.manager.clone();
        let broadcaster = self.broadcaster.clone();
        let session_id = self.id;
        let fut = async move { dispatch(manager, broadcaster, session_id, msg).await };
        ctx.spawn(actix::fut::wrap_future(fut).map(|resp, _act, ctx: &mut ws::WebsocketContext<Self>| {
            ctx.text(resp);
        }));
    }
}

async fn dispatch(
    manager: std::sync::Arc<crate::manager::GameManager>,
    broadcaster: Addr<GameBroadcaster>,
    session_id: Uuid,
    msg: WsClientMessage,
) -> String {
    let action = msg.action.as_str();
    let rid = &msg.request_id;

    macro_rules! require {
        ($opt:expr, $field:literal) => {
            match $opt {
                Some(v) => v,
                None => return missing_field(action, rid, $field),
            }
        };
    }

    let result: Result<serde_json::Value, crate::manager::ManagerError> = match action {
        "create_game" => {
            let config = require!(msg.config, "config");
            manager.create(config).await.map(|id| serde_json::json!({ "game_id": id }))
        }
        "list_games" => Ok(serde_json::json!({ "games": manager.list_games().await })),
        "get_stats" => Ok(serde_json::to_value(manager.get_stats().await).unwrap()),
        "get_game" => {
            let game_id = require!(msg.game_id, "game_id");
            manager.get_state(game_id).await.map(|v| serde_json::to_value(v).unwrap())
        }
        "delete_game" => {
            let game_id = require!(msg.game_id, "game_id");
            manager.remove(game_id).await.map(|()| serde_json::json!({ "deleted": true }))
        }
        "join" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let name = require!(msg.name, "name");
            let r = manager.join(game_id, player_id, name).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "leave" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let r = manager.leave(game_id, player_id).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "start" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let r = manager.start(game_id, player_id).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "make_move" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let command = require!(msg.command, "command");
            let r = manager.make_move(game_id, player_id, command, msg.turn_number).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "starvation_choice" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let piece_id = require!(msg.piece_id, "piece_id");
            let r = manager.submit_starvation_choice(game_id, player_id, piece_id).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "disconnect" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let r = manager.on_disconnect(game_id, player_id).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "reconnect" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let r = manager.on_reconnect(game_id, player_id).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "add_ai" => {
            let game_id = require!(msg.game_id, "game_id");
            let player_id = require!(msg.player_id, "player_id");
            let name = require!(msg.name, "name");
            let difficulty = msg.difficulty.unwrap_or_else(|| "heuristic".to_string());
            let r = manager.add_ai_player_with_config(game_id, player_id, name, &difficulty).await;
            broadcast_on_success(&broadcaster, game_id, &r);
            r.map(|events| serde_json::to_value(events).unwrap())
        }
        "subscribe" => {
            let game_id = require!(msg.game_id, "game_id");
            broadcaster.do_send(Subscribe { session_id, game_id });
            return build_response(action, rid, serde_json::json!({ "subscribed": game_id }));
        }
        "unsubscribe" => {
            let game_id = require!(msg.game_id, "game_id");
            broadcaster.do_send(Unsubscribe { session_id, game_id });
            return build_response(action, rid, serde_json::json!({ "unsubscribed": game_id }));
        }
        other => return build_error(other, rid, format!("unknown action: {other}")),
    };

    match result {
        Ok(data) => build_response(action, rid, data),
        Err(e) => build_error(action, rid, e),
    }
}

fn broadcast_on_success(
    broadcaster: &Addr<GameBroadcaster>,
    game_id: Uuid,
    result: &Result<Vec<GameEvent>, crate::manager::ManagerError>,
) {
    if let Ok(events) = result {
        broadcaster.do_send(BroadcastEvent { game_id, events: events.clone() });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("ws session {} started", self.id);
        self.start_heartbeat(ctx);
        self.broadcaster.do_send(Connect { addr: ctx.address(), session_id: self.id });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("ws session {} stopped", self.id);
        self.broadcaster.do_send(Disconnect { session_id: self.id });
    }
}

impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(text.to_string(), ctx),
            Ok(ws::Message::Binary(_)) => {
                ctx.text(build_error("binary", &None, "binary frames are not supported"));
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {}
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::error!("ws session {} protocol error: {}", self.id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<WsText> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// Upgrades the connection and starts a session actor. Subscriptions are
/// opt-in: the client sends a `subscribe` action once it knows which game
/// it cares about, rather than being auto-subscribed at connect time.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    broadcaster: web::Data<Addr<GameBroadcaster>>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = WsSession::new(app_state, broadcaster.get_ref().clone());
    ws::start(session, &req, stream)
}
