//! The AI capability port (SPEC_FULL.md §4.7): a trait any move-generating
//! collaborator implements, plus two built-in, dependency-free
//! implementations used as the scheduler's default and fallback.

use crate::hex::Hex;
use crate::types::{GameContext, MoveCommand, PieceId, PieceKind, PlayerId};
use async_trait::async_trait;
use rand::seq::SliceRandom;

/// A source of moves for an AI-controlled seat. Implementations may be
/// local (this module's `RandomAi`/`HeuristicAi`) or remote (an LLM
/// collaborator speaking some other protocol) — the scheduler only
/// depends on this trait, never on a concrete implementation.
#[async_trait]
pub trait AiPlayer: Send + Sync {
    /// Proposes a move for `player_id` given the current context. Returns
    /// `None` if the player has no legal move (should not happen for a
    /// well-formed game, but the scheduler treats it as a pass).
    async fn generate_move(&self, ctx: &GameContext, player_id: PlayerId) -> Option<MoveCommand>;

    /// Chooses which candidate Warrior to sacrifice during a starvation
    /// phase. `candidates` is always non-empty when called.
    async fn make_starvation_choice(
        &self,
        ctx: &GameContext,
        player_id: PlayerId,
        candidates: &[PieceId],
    ) -> PieceId;
}

/// Enumerates every legal destination for every piece `player_id` owns,
/// using the same legality check the manager applies to human moves.
pub fn legal_moves(ctx: &GameContext, player_id: PlayerId) -> Vec<MoveCommand> {
    let mut out = Vec::new();
    let radius = ctx.config.board_radius;
    for piece in ctx.pieces.iter().filter(|p| p.player_id == Some(player_id)) {
        let max_distance = match piece.kind {
            PieceKind::Jarl => 2,
            PieceKind::Warrior => 1,
            PieceKind::Shield => continue,
        };
        for d in 0..6 {
            for steps in 1..=max_distance {
                let mut dest = piece.position;
                for _ in 0..steps {
                    dest = dest.neighbor(d);
                }
                if !dest.is_on_board(radius) {
                    break;
                }
                let cmd = MoveCommand { piece_id: piece.id, destination: dest };
                let legality = crate::rules::check_move_legality(ctx, &cmd, player_id, true);
                if legality.valid {
                    out.push(cmd);
                }
            }
        }
    }
    out
}

/// Uniform-random move selection. The mandatory fallback per §4.7: always
/// available, never times out, picks uniformly among legal moves.
pub struct RandomAi;

#[async_trait]
impl AiPlayer for RandomAi {
    async fn generate_move(&self, ctx: &GameContext, player_id: PlayerId) -> Option<MoveCommand> {
        let moves = legal_moves(ctx, player_id);
        let mut rng = rand::thread_rng();
        moves.choose(&mut rng).copied()
    }

    async fn make_starvation_choice(
        &self,
        _ctx: &GameContext,
        _player_id: PlayerId,
        candidates: &[PieceId],
    ) -> PieceId {
        let mut rng = rand::thread_rng();
        *candidates.choose(&mut rng).expect("candidates is non-empty")
    }
}

/// A cheap static-evaluation heuristic: weights legal moves toward
/// captures, pushes that eliminate a piece, and away from leaving its own
/// Jarl exposed to an enemy with a clear attack line, then samples from
/// the top-weighted subset rather than choosing uniformly.
pub struct HeuristicAi {
    /// How many of the highest-scoring moves to sample from.
    pub top_n: usize,
}

impl Default for HeuristicAi {
    fn default() -> Self {
        Self { top_n: 3 }
    }
}

impl HeuristicAi {
    fn score_move(&self, ctx: &GameContext, player_id: PlayerId, cmd: &MoveCommand) -> i32 {
        let mut score = 0;
        let piece = ctx.piece(cmd.piece_id).expect("legal move references an existing piece");

        if let Some(defender) = ctx.piece_at(cmd.destination) {
            // Moving onto an enemy hex is always a capture attempt.
            score += 5 + defender.strength();
            let direction = piece.position.direction_to(cmd.destination).unwrap();
            let has_momentum = piece.kind == PieceKind::Jarl && piece.position.distance(cmd.destination) == 2;
            let combat = crate::rules::resolve_combat(ctx, piece, piece.position, defender, direction, has_momentum);
            if combat.pushed {
                score += 4;
            }
        }

        if piece.kind == PieceKind::Jarl {
            score -= exposure_penalty(ctx, player_id, cmd.destination);
        }

        score
    }

    async fn pick(&self, ctx: &GameContext, player_id: PlayerId, moves: Vec<MoveCommand>) -> Option<MoveCommand> {
        if moves.is_empty() {
            return None;
        }
        let mut scored: Vec<(i32, MoveCommand)> =
            moves.into_iter().map(|m| (self.score_move(ctx, player_id, &m), m)).collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let top = scored.len().min(self.top_n.max(1));
        let mut rng = rand::thread_rng();
        scored[..top].choose(&mut rng).map(|(_, m)| *m)
    }
}

/// How many enemy pieces have a clear one-step attack line onto `hex`.
fn exposure_penalty(ctx: &GameContext, player_id: PlayerId, hex: Hex) -> i32 {
    let mut penalty = 0;
    for enemy in ctx.pieces.iter().filter(|p| p.player_id.is_some() && p.player_id != Some(player_id)) {
        if enemy.position.distance(hex) == 1 {
            penalty += enemy.strength();
        }
    }
    penalty
}

#[async_trait]
impl AiPlayer for HeuristicAi {
    async fn generate_move(&self, ctx: &GameContext, player_id: PlayerId) -> Option<MoveCommand> {
        let moves = legal_moves(ctx, player_id);
        self.pick(ctx, player_id, moves).await
    }

    async fn make_starvation_choice(
        &self,
        ctx: &GameContext,
        _player_id: PlayerId,
        candidates: &[PieceId],
    ) -> PieceId {
        // Prefers sacrificing the weakest-positioned Warrior: the one
        // farthest from the throne stays the default (set up by
        // `compute_starvation_candidates` already filtering to the
        // farthest tier), so among ties prefer one with the fewest
        // friendly neighbors (least useful to keep).
        let best = candidates.iter().min_by_key(|&&id| {
            let piece = ctx.piece(id);
            piece
                .map(|p| p.position.neighbors().iter().filter(|n| ctx.piece_at(**n).is_some()).count())
                .unwrap_or(0)
        });
        *best.unwrap_or(&candidates[0])
    }
}

/// Picks the appropriate built-in AI for a difficulty label used by
/// `addAIPlayerWithConfig`; unrecognized labels fall back to heuristic.
pub fn ai_for_difficulty(difficulty: &str) -> Box<dyn AiPlayer> {
    match difficulty {
        "random" => Box::new(RandomAi),
        _ => Box::new(HeuristicAi::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameConfig, GameId, Piece, Player, Terrain};
    use uuid::Uuid;

    fn config() -> GameConfig {
        GameConfig { player_count: 2, board_radius: 4, warrior_count: 3, turn_timer_ms: None, terrain: Terrain::Calm }
    }

    fn sample_ctx() -> (GameContext, PlayerId) {
        let mut ctx = GameContext::new(GameId::new_v4(), config());
        let a = Uuid::new_v4();
        ctx.players.push(Player::new(a, "A".into(), true, "red".into()));
        ctx.current_player_id = Some(a);
        ctx.pieces.push(Piece { id: Uuid::new_v4(), kind: PieceKind::Jarl, player_id: Some(a), position: Hex::new(3, 0) });
        ctx.pieces.push(Piece { id: Uuid::new_v4(), kind: PieceKind::Warrior, player_id: Some(a), position: Hex::new(2, 0) });
        (ctx, a)
    }

    #[tokio::test]
    async fn random_ai_returns_a_legal_move() {
        let (ctx, player) = sample_ctx();
        let ai = RandomAi;
        let mv = ai.generate_move(&ctx, player).await.unwrap();
        let legality = crate::rules::check_move_legality(&ctx, &mv, player, true);
        assert!(legality.valid);
    }

    #[tokio::test]
    async fn heuristic_ai_prefers_captures() {
        let (mut ctx, player) = sample_ctx();
        let b = Uuid::new_v4();
        ctx.players.push(Player::new(b, "B".into(), true, "blue".into()));
        let target = Piece { id: Uuid::new_v4(), kind: PieceKind::Warrior, player_id: Some(b), position: Hex::new(1, 0) };
        let target_id = target.id;
        ctx.pieces.push(target);

        let ai = HeuristicAi::default();
        let warrior = ctx.pieces.iter().find(|p| p.kind == PieceKind::Warrior && p.player_id == Some(player)).unwrap();
        let capture_move = MoveCommand { piece_id: warrior.id, destination: Hex::new(1, 0) };
        let score = ai.score_move(&ctx, player, &capture_move);
        assert!(score > 0);
        let _ = target_id;
    }

    #[tokio::test]
    async fn heuristic_starvation_choice_is_among_candidates() {
        let (ctx, player) = sample_ctx();
        let candidates: Vec<PieceId> = ctx.warriors_of(player).map(|p| p.id).collect();
        let ai = HeuristicAi::default();
        let chosen = ai.make_starvation_choice(&ctx, player, &candidates).await;
        assert!(candidates.contains(&chosen));
    }
}
