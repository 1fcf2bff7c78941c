//! REST handlers, request/response DTOs, and OpenAPI documentation: an
//! `AppState` wrapping the manager, one handler per operation annotated
//! with `utoipa::path`, and a shared error mapper from the crate's
//! structured errors to HTTP status + JSON body.

use crate::manager::{GameManager, GameStateView, ManagerError, ManagerStats};
use crate::types::{GameConfig, GameId, MoveCommand, PieceId, PlayerId};
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::OpenApi;

pub struct AppState {
    pub manager: Arc<GameManager>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn manager_error_response(err: ManagerError) -> HttpResponse {
    let status = match &err {
        ManagerError::GameNotFound(_) => actix_web::http::StatusCode::NOT_FOUND,
        ManagerError::Store(crate::storage::StoreError::VersionConflict(_, _)) => actix_web::http::StatusCode::CONFLICT,
        ManagerError::Transition(crate::machine::TransitionError::StaleMove(_)) => actix_web::http::StatusCode::CONFLICT,
        ManagerError::Store(crate::storage::StoreError::DatabaseUnavailable(_)) => actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
        ManagerError::Store(crate::storage::StoreError::NotFound(_)) => actix_web::http::StatusCode::NOT_FOUND,
        _ => actix_web::http::StatusCode::BAD_REQUEST,
    };
    match &err {
        ManagerError::Store(crate::storage::StoreError::DatabaseUnavailable(e)) => {
            log::error!("Database unavailable: {}", e);
        }
        ManagerError::InvariantViolation(msg) => {
            log::error!("Invariant violation: {}", msg);
        }
        ManagerError::Transition(e) => {
            log::warn!("Move rejected: {}", e);
        }
        _ => {}
    }
    HttpResponse::build(status).json(ErrorResponse { error: err.to_string() })
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateGameRequest {
    pub config: GameConfig,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateGameResponse {
    pub game_id: GameId,
}

#[utoipa::path(post, path = "/games", request_body = CreateGameRequest,
    responses((status = 200, body = CreateGameResponse)))]
async fn create_game(state: web::Data<AppState>, body: web::Json<CreateGameRequest>) -> impl Responder {
    match state.manager.create(body.into_inner().config).await {
        Ok(game_id) => HttpResponse::Ok().json(CreateGameResponse { game_id }),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct JoinGameRequest {
    pub player_id: PlayerId,
    pub name: String,
}

#[utoipa::path(post, path = "/games/{game_id}/join", request_body = JoinGameRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn join_game(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<JoinGameRequest>,
) -> impl Responder {
    let body = body.into_inner();
    match state.manager.join(path.into_inner(), body.player_id, body.name).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PlayerIdRequest {
    pub player_id: PlayerId,
}

#[utoipa::path(post, path = "/games/{game_id}/leave", request_body = PlayerIdRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn leave_game(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<PlayerIdRequest>,
) -> impl Responder {
    match state.manager.leave(path.into_inner(), body.player_id).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[utoipa::path(post, path = "/games/{game_id}/start", request_body = PlayerIdRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn start_game(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<PlayerIdRequest>,
) -> impl Responder {
    match state.manager.start(path.into_inner(), body.player_id).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MakeMoveRequest {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub command: MoveCommand,
    /// The client's last-known turn number. When present and stale, the
    /// move is rejected rather than silently applied against a game state
    /// the client hasn't seen yet.
    #[serde(default)]
    pub turn_number: Option<u64>,
}

#[utoipa::path(post, path = "/games/{game_id}/move", request_body = MakeMoveRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn make_move(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<MakeMoveRequest>,
) -> impl Responder {
    let body = body.into_inner();
    match state
        .manager
        .make_move(path.into_inner(), body.player_id, body.command, body.turn_number)
        .await
    {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StarvationChoiceRequest {
    pub player_id: PlayerId,
    pub piece_id: PieceId,
}

#[utoipa::path(post, path = "/games/{game_id}/starvation-choice", request_body = StarvationChoiceRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn starvation_choice(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<StarvationChoiceRequest>,
) -> impl Responder {
    let body = body.into_inner();
    match state.manager.submit_starvation_choice(path.into_inner(), body.player_id, body.piece_id).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[utoipa::path(post, path = "/games/{game_id}/disconnect", request_body = PlayerIdRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn disconnect(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<PlayerIdRequest>,
) -> impl Responder {
    match state.manager.on_disconnect(path.into_inner(), body.player_id).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[utoipa::path(post, path = "/games/{game_id}/reconnect", request_body = PlayerIdRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn reconnect(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<PlayerIdRequest>,
) -> impl Responder {
    match state.manager.on_reconnect(path.into_inner(), body.player_id).await {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddAiPlayerRequest {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "heuristic".to_string()
}

#[utoipa::path(post, path = "/games/{game_id}/ai-players", request_body = AddAiPlayerRequest,
    responses((status = 200, body = [crate::types::GameEvent])))]
async fn add_ai_player(
    state: web::Data<AppState>,
    path: web::Path<GameId>,
    body: web::Json<AddAiPlayerRequest>,
) -> impl Responder {
    let body = body.into_inner();
    match state
        .manager
        .add_ai_player_with_config(path.into_inner(), body.player_id, body.name, &body.difficulty)
        .await
    {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => manager_error_response(e),
    }
}

#[utoipa::path(get, path = "/games", responses((status = 200, body = [GameId])))]
async fn list_games(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.manager.list_games().await)
}

#[utoipa::path(get, path = "/games/{game_id}", responses((status = 200, body = GameStateView)))]
async fn get_game(state: web::Data<AppState>, path: web::Path<GameId>) -> impl Responder {
    match state.manager.get_state(path.into_inner()).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => manager_error_response(e),
    }
}

#[utoipa::path(get, path = "/stats", responses((status = 200, body = ManagerStats)))]
async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.manager.get_stats().await)
}

#[utoipa::path(delete, path = "/games/{game_id}", responses((status = 200)))]
async fn remove_game(state: web::Data<AppState>, path: web::Path<GameId>) -> impl Responder {
    match state.manager.remove(path.into_inner()).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => manager_error_response(e),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/games").route(web::post().to(create_game)).route(web::get().to(list_games)))
        .service(
            web::resource("/games/{game_id}")
                .route(web::get().to(get_game))
                .route(web::delete().to(remove_game)),
        )
        .service(web::resource("/games/{game_id}/join").route(web::post().to(join_game)))
        .service(web::resource("/games/{game_id}/leave").route(web::post().to(leave_game)))
        .service(web::resource("/games/{game_id}/start").route(web::post().to(start_game)))
        .service(web::resource("/games/{game_id}/move").route(web::post().to(make_move)))
        .service(web::resource("/games/{game_id}/starvation-choice").route(web::post().to(starvation_choice)))
        .service(web::resource("/games/{game_id}/disconnect").route(web::post().to(disconnect)))
        .service(web::resource("/games/{game_id}/reconnect").route(web::post().to(reconnect)))
        .service(web::resource("/games/{game_id}/ai-players").route(web::post().to(add_ai_player)))
        .service(web::resource("/stats").route(web::get().to(get_stats)));
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_game, join_game, leave_game, start_game, make_move, starvation_choice,
        disconnect, reconnect, add_ai_player, list_games, get_game, get_stats, remove_game
    ),
    components(schemas(
        CreateGameRequest, CreateGameResponse, JoinGameRequest, PlayerIdRequest, MakeMoveRequest,
        StarvationChoiceRequest, AddAiPlayerRequest, ErrorResponse, ManagerStats, GameStateView,
        crate::types::GameConfig, crate::types::Terrain, crate::types::WinCondition,
        crate::types::RuleRejection, crate::types::GameEvent, crate::types::EliminationCause,
        crate::types::MoveCommand, crate::types::Piece, crate::types::PieceKind, crate::types::Hex,
        crate::machine::GameState
    )),
    tags((name = "jarls", description = "Authoritative Jarls game server"))
)]
pub struct ApiDoc;
