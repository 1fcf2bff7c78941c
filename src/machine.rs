//! The compound game state machine (SPEC_FULL.md §4.5): lobby, setup,
//! playing (with an `awaitingMove` sub-state), starvation, paused, and
//! ended. Owns transition legality; delegates move/combat/push/victory
//! logic to `rules` and board population to `setup`.

use crate::rules;
use crate::setup;
use crate::types::{GameContext, GameEvent, MoveCommand, PieceId, PlayerId, RuleRejection};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The machine's current state path. Sub-states of `Playing` are modeled
/// as the presence/absence of a timer deadline the manager tracks
/// alongside this enum, rather than further nesting, to keep the wire
/// representation flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum GameState {
    Lobby,
    Setup,
    Playing,
    Starvation,
    Paused,
    Ended,
}

/// A command accepted by the machine. Everything else is rejected with a
/// `TransitionError`.
#[derive(Debug, Clone)]
pub enum Command {
    Join { player_id: PlayerId, name: String, is_ai: bool },
    Leave { player_id: PlayerId },
    Start { player_id: PlayerId },
    Move { player_id: PlayerId, command: MoveCommand, expected_turn: Option<u64> },
    StarvationChoice { player_id: PlayerId, piece_id: PieceId },
    Disconnect { player_id: PlayerId },
    Reconnect { player_id: PlayerId },
    TurnTimeout,
    StarvationTimeout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("the lobby is already full")]
    LobbyFull,
    #[error("not enough players to start")]
    NotEnoughPlayers,
    #[error("only the host (first joiner) may start the game")]
    NotHost,
    #[error("the game is not in a state that accepts this command")]
    WrongState,
    #[error("move rejected: {0}")]
    Move(#[from] RuleRejection),
    #[error("stale move request: expected turn {0}")]
    StaleMove(u64),
    #[error("that player has no pending starvation choice")]
    NoStarvationChoice,
    #[error("that piece is not a valid starvation choice for this player")]
    InvalidStarvationChoice,
    #[error("player not found in this game")]
    PlayerNotFound,
    #[error("that player is not disconnected")]
    NotDisconnected,
}

/// Drives one command through the machine, mutating `ctx` and `state` and
/// returning the events raised. `rng` is only consulted by `Start`
/// (board/hole placement).
pub fn apply<R: Rng>(
    state: &mut GameState,
    ctx: &mut GameContext,
    cmd: Command,
    rng: &mut R,
) -> Result<Vec<GameEvent>, TransitionError> {
    match cmd {
        Command::Join { player_id, name, is_ai } => join(state, ctx, player_id, name, is_ai),
        Command::Leave { player_id } => leave(state, ctx, player_id),
        Command::Start { player_id } => start(state, ctx, player_id, rng),
        Command::Move { player_id, command, expected_turn } => make_move(state, ctx, player_id, command, expected_turn),
        Command::StarvationChoice { player_id, piece_id } => {
            starvation_choice(state, ctx, player_id, piece_id)
        }
        Command::Disconnect { player_id } => disconnect(state, ctx, player_id),
        Command::Reconnect { player_id } => reconnect(state, ctx, player_id),
        Command::TurnTimeout => turn_timeout(state, ctx),
        Command::StarvationTimeout => starvation_timeout(state, ctx),
    }
}

fn join(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
    name: String,
    is_ai: bool,
) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Lobby {
        return Err(TransitionError::WrongState);
    }
    if ctx.players.len() >= ctx.config.player_count as usize {
        return Err(TransitionError::LobbyFull);
    }
    ctx.players.push(crate::types::Player::new(
        player_id,
        name.clone(),
        is_ai,
        default_color(ctx.players.len()),
    ));
    Ok(vec![GameEvent::PlayerJoined { player_id, name }])
}

fn default_color(seat_index: usize) -> String {
    const PALETTE: [&str; 6] = ["red", "blue", "green", "yellow", "purple", "orange"];
    PALETTE[seat_index % PALETTE.len()].to_string()
}

fn leave(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Lobby {
        return Err(TransitionError::WrongState);
    }
    let before = ctx.players.len();
    ctx.players.retain(|p| p.id != player_id);
    if ctx.players.len() == before {
        return Err(TransitionError::PlayerNotFound);
    }
    Ok(vec![GameEvent::PlayerLeft { player_id }])
}

fn start<R: Rng>(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
    rng: &mut R,
) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Lobby {
        return Err(TransitionError::WrongState);
    }
    if ctx.players.len() < 2 {
        return Err(TransitionError::NotEnoughPlayers);
    }
    if ctx.players.first().map(|p| p.id) != Some(player_id) {
        return Err(TransitionError::NotHost);
    }
    *state = GameState::Setup;
    setup::setup_board(ctx, rng);
    *state = GameState::Playing;
    Ok(Vec::new())
}

fn make_move(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
    command: MoveCommand,
    expected_turn: Option<u64>,
) -> Result<Vec<GameEvent>, TransitionError> {
    if let Some(expected) = expected_turn
        && expected != ctx.turn_number
    {
        return Err(TransitionError::StaleMove(ctx.turn_number));
    }

    let is_playing = *state == GameState::Playing;
    let legality = rules::check_move_legality(ctx, &command, player_id, is_playing);
    if !legality.valid {
        return Err(TransitionError::Move(legality.reason.unwrap()));
    }

    let piece = ctx.piece(command.piece_id).unwrap();
    let from = piece.position;
    let to = legality.adjusted_destination.unwrap_or(command.destination);
    let direction = from.direction_to(to).expect("already validated as a straight line");

    let mut events = Vec::new();
    let mut had_elimination = false;

    if let Some(defender) = ctx.piece_at(to).cloned() {
        let attacker = ctx.piece(command.piece_id).unwrap().clone();
        let combat = rules::resolve_combat(ctx, &attacker, from, &defender, direction, legality.has_momentum);
        events.push(GameEvent::Move {
            piece_id: command.piece_id,
            player_id,
            from,
            to,
            has_momentum: legality.has_momentum,
        });
        if combat.pushed {
            let outcome = rules::resolve_push(ctx, command.piece_id, defender.position, direction);
            had_elimination = outcome.terminator == crate::types::ChainTerminator::Edge
                || outcome.terminator == crate::types::ChainTerminator::Hole;
            events.extend(outcome.events);
        }
        // A blocked attack (attack <= defense) leaves both pieces in place;
        // nothing further to apply.
    } else {
        ctx.pieces
            .iter_mut()
            .find(|p| p.id == command.piece_id)
            .unwrap()
            .position = to;
        events.push(GameEvent::Move {
            piece_id: command.piece_id,
            player_id,
            from,
            to,
            has_momentum: legality.has_momentum,
        });
    }

    ctx.push_move_history(crate::types::MoveHistoryEntry {
        turn_number: ctx.turn_number,
        player_id,
        piece_id: command.piece_id,
        from,
        to,
    });
    ctx.turn_number += 1;

    let mover_still_present = ctx.piece(command.piece_id).is_some();
    let mover_id = if mover_still_present { Some(command.piece_id) } else { None };
    let outcome = rules::run_post_move_pipeline(ctx, mover_id, had_elimination);
    events.extend(outcome.events);

    if outcome.ended {
        *state = GameState::Ended;
    } else if outcome.starvation_triggered {
        ctx.starvation_candidates = rules::compute_starvation_candidates(ctx);
        *state = GameState::Starvation;
    }

    Ok(events)
}

fn starvation_choice(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
    piece_id: PieceId,
) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Starvation {
        return Err(TransitionError::WrongState);
    }
    let candidates = ctx
        .starvation_candidates
        .get(&player_id)
        .ok_or(TransitionError::NoStarvationChoice)?;
    if !candidates.contains(&piece_id) {
        return Err(TransitionError::InvalidStarvationChoice);
    }
    ctx.starvation_choices.insert(player_id, piece_id);

    let awaiting: Vec<PlayerId> = ctx
        .starvation_candidates
        .iter()
        .filter(|(_, c)| !c.is_empty())
        .map(|(p, _)| *p)
        .collect();
    let all_in = awaiting.iter().all(|p| ctx.starvation_choices.contains_key(p));

    if !all_in {
        return Ok(Vec::new());
    }
    resolve_starvation_and_resume(state, ctx)
}

fn resolve_starvation_and_resume(
    state: &mut GameState,
    ctx: &mut GameContext,
) -> Result<Vec<GameEvent>, TransitionError> {
    let choices = ctx.starvation_choices.clone();
    let mut events = rules::resolve_starvation(ctx, &choices);

    let remaining: Vec<PlayerId> = ctx.non_eliminated_players().map(|p| p.id).collect();
    if remaining.len() <= 1 {
        ctx.winner_id = remaining.first().copied();
        ctx.win_condition = Some(crate::types::WinCondition::LastStanding);
        events.push(GameEvent::GameEnded {
            winner_id: ctx.winner_id,
            win_condition: crate::types::WinCondition::LastStanding,
        });
        *state = GameState::Ended;
    } else {
        *state = GameState::Playing;
    }
    Ok(events)
}

fn disconnect(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
) -> Result<Vec<GameEvent>, TransitionError> {
    if !matches!(*state, GameState::Playing | GameState::Starvation | GameState::Paused) {
        return Err(TransitionError::WrongState);
    }
    if ctx.player(player_id).is_none() {
        return Err(TransitionError::PlayerNotFound);
    }
    ctx.disconnected_players.insert(player_id);
    if ctx.current_player_id == Some(player_id) {
        *state = GameState::Paused;
    }
    Ok(Vec::new())
}

fn reconnect(
    state: &mut GameState,
    ctx: &mut GameContext,
    player_id: PlayerId,
) -> Result<Vec<GameEvent>, TransitionError> {
    if ctx.player(player_id).is_none() {
        return Err(TransitionError::PlayerNotFound);
    }
    if !ctx.disconnected_players.remove(&player_id) {
        return Err(TransitionError::NotDisconnected);
    }
    if *state == GameState::Paused && ctx.current_player_id == Some(player_id) {
        *state = GameState::Playing;
    }
    Ok(Vec::new())
}

fn turn_timeout(state: &mut GameState, ctx: &mut GameContext) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Playing {
        return Err(TransitionError::WrongState);
    }
    let Some(current) = ctx.current_player_id else {
        return Ok(Vec::new());
    };
    let mut events = vec![GameEvent::TurnSkipped { player_id: current }];
    let outcome = rules::run_post_move_pipeline(ctx, None, false);
    events.extend(outcome.events);
    if outcome.ended {
        *state = GameState::Ended;
    } else if outcome.starvation_triggered {
        ctx.starvation_candidates = rules::compute_starvation_candidates(ctx);
        *state = GameState::Starvation;
    }
    Ok(events)
}

fn starvation_timeout(
    state: &mut GameState,
    ctx: &mut GameContext,
) -> Result<Vec<GameEvent>, TransitionError> {
    if *state != GameState::Starvation {
        return Err(TransitionError::WrongState);
    }
    // Missing choices default to the first listed candidate; `resolve_starvation`
    // already applies this fallback for any player absent from the choice map.
    resolve_starvation_and_resume(state, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameConfig, GameId, Terrain};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;

    fn new_game() -> (GameState, GameContext) {
        let config = GameConfig {
            player_count: 2,
            board_radius: 5,
            warrior_count: 3,
            turn_timer_ms: None,
            terrain: Terrain::Calm,
        };
        (GameState::Lobby, GameContext::new(GameId::new_v4(), config))
    }

    #[test]
    fn join_then_start_transitions_to_playing() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let host = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: host, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: Uuid::new_v4(), name: "B".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Start { player_id: host }, &mut rng).unwrap();
        assert_eq!(state, GameState::Playing);
        assert!(!ctx.pieces.is_empty());
    }

    #[test]
    fn start_rejects_incomplete_lobby() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let host = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: host, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        let err = apply(&mut state, &mut ctx, Command::Start { player_id: host }, &mut rng).unwrap_err();
        assert_eq!(err, TransitionError::NotEnoughPlayers);
    }

    #[test]
    fn start_rejects_non_host() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let host = Uuid::new_v4();
        let other = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: host, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: other, name: "B".into(), is_ai: false }, &mut rng).unwrap();
        let err = apply(&mut state, &mut ctx, Command::Start { player_id: other }, &mut rng).unwrap_err();
        assert_eq!(err, TransitionError::NotHost);
    }

    #[test]
    fn disconnect_of_current_player_pauses() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: a, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: b, name: "B".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Start { player_id: a }, &mut rng).unwrap();
        let current = ctx.current_player_id.unwrap();
        apply(&mut state, &mut ctx, Command::Disconnect { player_id: current }, &mut rng).unwrap();
        assert_eq!(state, GameState::Paused);
        apply(&mut state, &mut ctx, Command::Reconnect { player_id: current }, &mut rng).unwrap();
        assert_eq!(state, GameState::Playing);
    }

    #[test]
    fn disconnect_of_non_current_player_during_pause_does_not_error() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: a, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: b, name: "B".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Start { player_id: a }, &mut rng).unwrap();
        let current = ctx.current_player_id.unwrap();
        let other = if current == a { b } else { a };
        apply(&mut state, &mut ctx, Command::Disconnect { player_id: current }, &mut rng).unwrap();
        assert_eq!(state, GameState::Paused);
        // A second player disconnecting during an existing pause must still
        // be accepted.
        apply(&mut state, &mut ctx, Command::Disconnect { player_id: other }, &mut rng).unwrap();
        assert_eq!(state, GameState::Paused);
        assert!(ctx.disconnected_players.contains(&other));
    }

    #[test]
    fn disconnect_unknown_player_is_rejected() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: a, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: b, name: "B".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Start { player_id: a }, &mut rng).unwrap();
        let err = apply(&mut state, &mut ctx, Command::Disconnect { player_id: Uuid::new_v4() }, &mut rng).unwrap_err();
        assert_eq!(err, TransitionError::PlayerNotFound);
    }

    #[test]
    fn reconnect_of_not_disconnected_player_is_rejected() {
        let (mut state, mut ctx) = new_game();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        apply(&mut state, &mut ctx, Command::Join { player_id: a, name: "A".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Join { player_id: b, name: "B".into(), is_ai: false }, &mut rng).unwrap();
        apply(&mut state, &mut ctx, Command::Start { player_id: a }, &mut rng).unwrap();
        let err = apply(&mut state, &mut ctx, Command::Reconnect { player_id: a }, &mut rng).unwrap_err();
        assert_eq!(err, TransitionError::NotDisconnected);
    }
}
