//! Core data types for the Jarls game engine.
//!
//! This module defines the fundamental structures shared by the rules core,
//! the game machine, and the manager: pieces, players, game configuration,
//! and the `GameContext` the state machine owns. All types follow the data
//! model in SPEC_FULL.md §3 and use the JSON wire format the REST/WebSocket
//! layers expose to clients.

use crate::hex::Hex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type PieceId = Uuid;
pub type GameId = Uuid;

/// How many of the most recent moves are retained in `GameContext::move_history`
/// for AI context (SPEC_FULL.md §3, `moveHistory`).
pub const MOVE_HISTORY_CAPACITY: usize = 20;

// ---------------------------------------------------------------------------
// Piece & Player
// ---------------------------------------------------------------------------

/// The kind of a piece. Shields are neutral (never owned by a player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Jarl,
    Warrior,
    Shield,
}

impl PieceKind {
    /// Base combat strength: Jarl = 2, Warrior = 1, Shield = 0.
    pub fn base_strength(self) -> i32 {
        match self {
            PieceKind::Jarl => 2,
            PieceKind::Warrior => 1,
            PieceKind::Shield => 0,
        }
    }
}

/// A single piece on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Piece {
    pub id: PieceId,
    #[serde(rename = "type")]
    pub kind: PieceKind,
    /// `None` for shields; `Some` for Jarls and Warriors.
    pub player_id: Option<PlayerId>,
    pub position: Hex,
}

impl Piece {
    pub fn strength(&self) -> i32 {
        self.kind.base_strength()
    }

    pub fn is_friendly_to(&self, player_id: PlayerId) -> bool {
        self.player_id == Some(player_id)
    }

    pub fn is_enemy_of(&self, player_id: PlayerId) -> bool {
        matches!(self.player_id, Some(owner) if owner != player_id)
    }
}

/// A player seated at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_eliminated: bool,
    /// `None` means the player still owns Warriors, or never lost their
    /// last one. Starts counting at 0 the round they first reach zero
    /// Warriors; resets to `None` the moment they regain one.
    pub rounds_since_last_warrior: Option<u32>,
    pub is_ai: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, is_ai: bool, color: String) -> Self {
        Self {
            id,
            name,
            color,
            is_eliminated: false,
            rounds_since_last_warrior: None,
            is_ai,
        }
    }
}

// ---------------------------------------------------------------------------
// Game configuration
// ---------------------------------------------------------------------------

/// Terrain preset, determining the base hole count (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Calm,
    Treacherous,
    Chaotic,
}

impl Terrain {
    pub fn base_hole_count(self) -> usize {
        match self {
            Terrain::Calm => 3,
            Terrain::Treacherous => 6,
            Terrain::Chaotic => 9,
        }
    }
}

/// Immutable per-game configuration, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GameConfig {
    pub player_count: u8,
    pub board_radius: i32,
    pub warrior_count: u8,
    /// `None` disables the per-turn timer.
    pub turn_timer_ms: Option<u64>,
    pub terrain: Terrain,
}

impl GameConfig {
    pub fn hole_count(self) -> usize {
        self.terrain.base_hole_count()
    }
}

// ---------------------------------------------------------------------------
// Win condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum WinCondition {
    Throne,
    LastStanding,
}

/// Cause of a piece elimination, for the `ELIMINATED` event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum EliminationCause {
    Edge,
    Hole,
    Starvation,
    JarlStarvation,
}

// ---------------------------------------------------------------------------
// GameContext — the state machine's data
// ---------------------------------------------------------------------------

/// The complete data owned by a game's state machine. This is what gets
/// serialized into the persistence port's opaque `state` blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameContext {
    pub game_id: GameId,
    pub config: GameConfig,
    pub players: Vec<Player>,
    pub pieces: Vec<Piece>,
    pub holes: Vec<Hex>,
    pub current_player_id: Option<PlayerId>,
    pub turn_number: u64,
    pub round_number: u64,
    pub first_player_index: usize,
    pub rounds_since_elimination: u64,
    pub winner_id: Option<PlayerId>,
    pub win_condition: Option<WinCondition>,
    pub disconnected_players: HashSet<PlayerId>,
    pub starvation_candidates: std::collections::HashMap<PlayerId, Vec<PieceId>>,
    pub starvation_choices: std::collections::HashMap<PlayerId, PieceId>,
    pub move_history: VecDeque<MoveHistoryEntry>,
}

impl GameContext {
    pub fn new(game_id: GameId, config: GameConfig) -> Self {
        Self {
            game_id,
            config,
            players: Vec::new(),
            pieces: Vec::new(),
            holes: Vec::new(),
            current_player_id: None,
            turn_number: 0,
            round_number: 0,
            first_player_index: 0,
            rounds_since_elimination: 0,
            winner_id: None,
            win_condition: None,
            disconnected_players: HashSet::new(),
            starvation_candidates: std::collections::HashMap::new(),
            starvation_choices: std::collections::HashMap::new(),
            move_history: VecDeque::new(),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    pub fn piece_at(&self, hex: Hex) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.position == hex)
    }

    pub fn piece_at_mut(&mut self, hex: Hex) -> Option<&mut Piece> {
        self.pieces.iter_mut().find(|p| p.position == hex)
    }

    pub fn jarl_of(&self, player_id: PlayerId) -> Option<&Piece> {
        self.pieces
            .iter()
            .find(|p| p.kind == PieceKind::Jarl && p.player_id == Some(player_id))
    }

    pub fn warriors_of(&self, player_id: PlayerId) -> impl Iterator<Item = &Piece> {
        self.pieces
            .iter()
            .filter(move |p| p.kind == PieceKind::Warrior && p.player_id == Some(player_id))
    }

    pub fn non_eliminated_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.is_eliminated)
    }

    pub fn seat_order(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Pushes a move into the bounded move-history ring, evicting the
    /// oldest entry once at capacity.
    pub fn push_move_history(&mut self, entry: MoveHistoryEntry) {
        if self.move_history.len() >= MOVE_HISTORY_CAPACITY {
            self.move_history.pop_front();
        }
        self.move_history.push_back(entry);
    }

    /// Invariant check: no two pieces occupy the same hex (SPEC_FULL.md §3
    /// invariant 1, and the manager's integrity guard in §4.6 step 6).
    pub fn has_unique_piece_positions(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.pieces.len());
        self.pieces.iter().all(|p| seen.insert(p.position))
    }
}

/// A compact record of one applied move, kept for AI context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveHistoryEntry {
    pub turn_number: u64,
    pub player_id: PlayerId,
    pub piece_id: PieceId,
    pub from: Hex,
    pub to: Hex,
}

// ---------------------------------------------------------------------------
// Move command and legality result
// ---------------------------------------------------------------------------

/// A move submitted by a player or AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MoveCommand {
    pub piece_id: PieceId,
    pub destination: Hex,
}

/// All legality rejection reasons the rules core may return (SPEC_FULL.md
/// §4.1). This enumeration is closed — no other reasons are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleRejection {
    #[error("piece not found")]
    PieceNotFound,
    #[error("not your piece")]
    NotYourPiece,
    #[error("not your turn")]
    NotYourTurn,
    #[error("game is not in the playing state")]
    GameNotPlaying,
    #[error("destination is off the board")]
    DestinationOffBoard,
    #[error("destination is occupied by a friendly piece")]
    DestinationOccupiedFriendly,
    #[error("a warrior cannot enter the throne")]
    WarriorCannotEnterThrone,
    #[error("warriors may only move exactly one hex")]
    InvalidDistanceWarrior,
    #[error("jarls may only move one or two hexes")]
    InvalidDistanceJarl,
    #[error("a jarl needs a draft formation to move two hexes")]
    JarlNeedsDraftForTwoHex,
    #[error("the path is blocked")]
    PathBlocked,
    #[error("the move is not a straight hex line")]
    MoveNotStraightLine,
    #[error("shields cannot move")]
    ShieldCannotMove,
}

/// The rules core's movement-legality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveLegality {
    pub valid: bool,
    pub reason: Option<RuleRejection>,
    pub has_momentum: bool,
    /// Set when a two-hex Jarl move's line crosses the throne — the
    /// destination is truncated to the throne.
    pub adjusted_destination: Option<Hex>,
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// Full breakdown of a combat resolution, for observability and client
/// preview (SPEC_FULL.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CombatResult {
    pub attacker_base: i32,
    pub defender_base: i32,
    pub momentum_bonus: i32,
    pub inline_support: i32,
    pub bracing: i32,
    pub attack_total: i32,
    pub defense_total: i32,
    pub pushed: bool,
    /// The axial direction index the push (if any) travels in.
    pub push_direction: Option<usize>,
}

// ---------------------------------------------------------------------------
// Push chain terminators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChainTerminator {
    Empty,
    Edge,
    Hole,
    Throne,
}

// ---------------------------------------------------------------------------
// Events (the wire-stable taxonomy from SPEC_FULL.md §6)
// ---------------------------------------------------------------------------

/// A game event, discriminated by `type`. This is the payload-stable wire
/// format emitted to subscribers and persisted to the event log.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    Move {
        piece_id: PieceId,
        player_id: PlayerId,
        from: Hex,
        to: Hex,
        has_momentum: bool,
    },
    #[serde(rename_all = "camelCase")]
    Push {
        piece_id: PieceId,
        from: Hex,
        to: Hex,
        depth: u32,
    },
    #[serde(rename_all = "camelCase")]
    Eliminated {
        piece_id: PieceId,
        player_id: Option<PlayerId>,
        cause: EliminationCause,
    },
    #[serde(rename_all = "camelCase")]
    TurnEnded {
        next_player_id: PlayerId,
        round_number: u64,
    },
    #[serde(rename_all = "camelCase")]
    TurnSkipped { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    GameEnded {
        winner_id: Option<PlayerId>,
        win_condition: WinCondition,
    },
    StarvationTriggered,
    StarvationResolved,
    #[serde(rename_all = "camelCase")]
    JarlStarved { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { player_id: PlayerId, name: String },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_strength_matches_glossary() {
        assert_eq!(PieceKind::Jarl.base_strength(), 2);
        assert_eq!(PieceKind::Warrior.base_strength(), 1);
        assert_eq!(PieceKind::Shield.base_strength(), 0);
    }

    #[test]
    fn context_detects_duplicate_positions() {
        let mut ctx = GameContext::new(
            Uuid::new_v4(),
            GameConfig {
                player_count: 2,
                board_radius: 3,
                warrior_count: 4,
                turn_timer_ms: None,
                terrain: Terrain::Calm,
            },
        );
        let pos = Hex::new(1, 0);
        ctx.pieces.push(Piece {
            id: Uuid::new_v4(),
            kind: PieceKind::Warrior,
            player_id: None,
            position: pos,
        });
        assert!(ctx.has_unique_piece_positions());
        ctx.pieces.push(Piece {
            id: Uuid::new_v4(),
            kind: PieceKind::Warrior,
            player_id: None,
            position: pos,
        });
        assert!(!ctx.has_unique_piece_positions());
    }

    #[test]
    fn move_history_ring_is_bounded() {
        let mut ctx = GameContext::new(
            Uuid::new_v4(),
            GameConfig {
                player_count: 2,
                board_radius: 3,
                warrior_count: 4,
                turn_timer_ms: None,
                terrain: Terrain::Calm,
            },
        );
        for i in 0..(MOVE_HISTORY_CAPACITY as u64 + 5) {
            ctx.push_move_history(MoveHistoryEntry {
                turn_number: i,
                player_id: Uuid::new_v4(),
                piece_id: Uuid::new_v4(),
                from: Hex::new(0, 0),
                to: Hex::new(1, 0),
            });
        }
        assert_eq!(ctx.move_history.len(), MOVE_HISTORY_CAPACITY);
        assert_eq!(ctx.move_history.front().unwrap().turn_number, 5);
    }
}
