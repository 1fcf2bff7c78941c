//! Deterministic board setup: seats Jarls on evenly spaced edge hexes,
//! lines up Warriors behind them toward the throne, and scatters holes
//! across the remaining interior (SPEC_FULL.md §4.5's `setup` action).

use crate::hex::{Hex, THRONE};
use crate::types::{GameConfig, GameContext, Piece, PieceKind, Player};
use rand::seq::SliceRandom;
use rand::Rng;

/// Populates `ctx.pieces` and `ctx.holes` from `ctx.players` and `ctx.config`.
/// `ctx.players` must already be seated (SPEC_FULL.md §4.5 requires at least
/// `config.player_count` joined players before `setup` runs).
pub fn setup_board<R: Rng>(ctx: &mut GameContext, rng: &mut R) {
    place_jarls_and_warriors(ctx);
    scatter_holes(ctx, rng);
    ctx.current_player_id = ctx.players.first().map(|p| p.id);
}

fn place_jarls_and_warriors(ctx: &mut GameContext) {
    let radius = ctx.config.board_radius;
    let directions = evenly_spaced_directions(ctx.players.len());

    for (player, &d) in ctx.players.clone().iter().zip(directions.iter()) {
        // A corner hex (radius steps in a single primary direction from the
        // throne) is, by construction, exactly collinear with it — unlike
        // an arbitrary edge hex, which the hex grid's 6 axes don't reach.
        let jarl_hex = Hex::new(0, 0).neighbor(d);
        let jarl_hex = (1..radius).fold(jarl_hex, |h, _| h.neighbor(d));

        let jarl = Piece {
            id: uuid::Uuid::new_v4(),
            kind: PieceKind::Jarl,
            player_id: Some(player.id),
            position: jarl_hex,
        };
        ctx.pieces.push(jarl);

        let toward_throne = Hex::opposite_direction(d);
        let mut cur = jarl_hex;
        for _ in 0..ctx.config.warrior_count {
            cur = cur.neighbor(toward_throne);
            let warrior = Piece {
                id: uuid::Uuid::new_v4(),
                kind: PieceKind::Warrior,
                player_id: Some(player.id),
                position: cur,
            };
            ctx.pieces.push(warrior);
        }
    }
}

/// Picks `count` of the 6 primary directions spaced as evenly as possible
/// around the throne. `count` must be at most 6 (`validate_config` enforces
/// this).
fn evenly_spaced_directions(count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    (0..count).map(|i| (i * 6) / count).collect()
}

/// Samples `config.hole_count()` holes from interior hexes, excluding the
/// throne and any hex already occupied by a piece.
fn scatter_holes<R: Rng>(ctx: &mut GameContext, rng: &mut R) {
    let radius = ctx.config.board_radius;
    let occupied: std::collections::HashSet<Hex> = ctx.pieces.iter().map(|p| p.position).collect();

    let mut candidates: Vec<Hex> = Hex::all_on_board(radius)
        .into_iter()
        .filter(|h| *h != THRONE && !h.is_on_edge(radius) && !occupied.contains(h))
        .collect();
    candidates.shuffle(rng);

    let count = ctx.config.hole_count().min(candidates.len());
    ctx.holes = candidates.into_iter().take(count).collect();
}

/// Validates a `GameConfig` against the structural constraints setup
/// depends on: enough edge hexes for every seat, and a Jarl-to-throne lane
/// long enough to hold `warrior_count` Warriors without falling off the
/// board.
pub fn validate_config(config: &GameConfig) -> bool {
    if !(2..=6).contains(&config.player_count) || config.board_radius < 2 {
        return false;
    }
    (config.warrior_count as i32) < config.board_radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, Terrain};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config() -> GameConfig {
        GameConfig {
            player_count: 2,
            board_radius: 5,
            warrior_count: 3,
            turn_timer_ms: None,
            terrain: Terrain::Calm,
        }
    }

    #[test]
    fn setup_places_one_jarl_and_n_warriors_per_player() {
        let mut ctx = GameContext::new(GameId::new_v4(), config());
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "A".into(), false, "red".into()));
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "B".into(), false, "blue".into()));

        let mut rng = StdRng::seed_from_u64(42);
        setup_board(&mut ctx, &mut rng);

        for player in ctx.players.clone() {
            assert!(ctx.jarl_of(player.id).is_some());
            assert_eq!(ctx.warriors_of(player.id).count(), 3);
        }
        assert!(ctx.has_unique_piece_positions());
        assert!(ctx.current_player_id.is_some());
    }

    #[test]
    fn setup_places_jarls_on_edge() {
        let mut ctx = GameContext::new(GameId::new_v4(), config());
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "A".into(), false, "red".into()));
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "B".into(), false, "blue".into()));
        let mut rng = StdRng::seed_from_u64(7);
        setup_board(&mut ctx, &mut rng);

        for player in ctx.players.clone() {
            let jarl = ctx.jarl_of(player.id).unwrap();
            assert!(jarl.position.is_on_edge(ctx.config.board_radius));
        }
    }

    #[test]
    fn holes_avoid_throne_edge_and_pieces() {
        let mut ctx = GameContext::new(GameId::new_v4(), config());
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "A".into(), false, "red".into()));
        ctx.players.push(Player::new(uuid::Uuid::new_v4(), "B".into(), false, "blue".into()));
        let mut rng = StdRng::seed_from_u64(99);
        setup_board(&mut ctx, &mut rng);

        assert_eq!(ctx.holes.len(), ctx.config.hole_count());
        let occupied: std::collections::HashSet<Hex> = ctx.pieces.iter().map(|p| p.position).collect();
        for hole in &ctx.holes {
            assert_ne!(*hole, THRONE);
            assert!(!hole.is_on_edge(ctx.config.board_radius));
            assert!(!occupied.contains(hole));
        }
    }

    #[test]
    fn config_requires_enough_room_for_warriors() {
        let mut bad = config();
        bad.warrior_count = 10;
        assert!(!validate_config(&bad));
        assert!(validate_config(&config()));
    }
}
