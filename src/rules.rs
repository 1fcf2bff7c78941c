//! The rules core: movement legality, combat arithmetic, push-chain
//! resolution, and the post-move pipeline (victory checks, turn rotation,
//! starvation). Pure functions over `GameContext` — no I/O, no async, no
//! knowledge of the manager or the transport layer.

use crate::hex::{Hex, THRONE};
use crate::types::*;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Movement legality (SPEC_FULL.md §4.1)
// ---------------------------------------------------------------------------

/// Checks whether `cmd` is a legal move for `player_id` to make right now.
/// `is_playing` reflects whether the game machine is currently in
/// `playing.awaitingMove` — the rules core cannot see the machine's state
/// path itself, so the caller supplies it.
pub fn check_move_legality(
    ctx: &GameContext,
    cmd: &MoveCommand,
    player_id: PlayerId,
    is_playing: bool,
) -> MoveLegality {
    let reject = |reason: RuleRejection| MoveLegality {
        valid: false,
        reason: Some(reason),
        has_momentum: false,
        adjusted_destination: None,
    };

    if !is_playing {
        return reject(RuleRejection::GameNotPlaying);
    }

    let Some(piece) = ctx.piece(cmd.piece_id) else {
        return reject(RuleRejection::PieceNotFound);
    };

    if piece.kind == PieceKind::Shield {
        return reject(RuleRejection::ShieldCannotMove);
    }
    if piece.player_id != Some(player_id) {
        return reject(RuleRejection::NotYourPiece);
    }
    if ctx.current_player_id != Some(player_id) {
        return reject(RuleRejection::NotYourTurn);
    }

    let Some(direction) = piece.position.direction_to(cmd.destination) else {
        return reject(RuleRejection::MoveNotStraightLine);
    };
    let distance = piece.position.distance(cmd.destination);

    let mut has_momentum = false;
    match piece.kind {
        PieceKind::Warrior => {
            if distance != 1 {
                return reject(RuleRejection::InvalidDistanceWarrior);
            }
        }
        PieceKind::Jarl => {
            if distance != 1 && distance != 2 {
                return reject(RuleRejection::InvalidDistanceJarl);
            }
            if distance == 2 {
                if !has_draft_formation(ctx, piece, direction) {
                    return reject(RuleRejection::JarlNeedsDraftForTwoHex);
                }
                has_momentum = true;
            }
        }
        PieceKind::Shield => unreachable!("shields are rejected above"),
    }

    // Throne-crossing special case: a two-hex Jarl move whose line passes
    // through the throne truncates to it (SPEC_FULL.md §4.1).
    let mut adjusted_destination = None;
    if distance == 2 {
        let intermediate = piece.position.neighbor(direction);
        if !intermediate.is_on_board(ctx.config.board_radius) {
            // Geometrically unreachable: a two-step line whose final hex is
            // on the board always has its midpoint on the board too, since
            // the board is a convex hex disk. Kept for the closed rejection
            // enum's completeness.
            return reject(RuleRejection::PathBlocked);
        }
        if intermediate == THRONE {
            adjusted_destination = Some(THRONE);
        }
    }

    let effective_destination = adjusted_destination.unwrap_or(cmd.destination);

    if !effective_destination.is_on_board(ctx.config.board_radius) {
        return reject(RuleRejection::DestinationOffBoard);
    }
    if piece.kind == PieceKind::Warrior && effective_destination == THRONE {
        return reject(RuleRejection::WarriorCannotEnterThrone);
    }

    if let Some(occupant) = ctx.piece_at(effective_destination) {
        let blocks_entry = occupant.kind == PieceKind::Shield || occupant.player_id == Some(player_id);
        if blocks_entry {
            return reject(RuleRejection::DestinationOccupiedFriendly);
        }
    }

    MoveLegality {
        valid: true,
        reason: None,
        has_momentum,
        adjusted_destination,
    }
}

/// A Jarl may move two hexes only if at least two friendly pieces stand in
/// a strictly contiguous line directly behind it in the move's direction.
fn has_draft_formation(ctx: &GameContext, jarl: &Piece, direction: usize) -> bool {
    let owner = match jarl.player_id {
        Some(p) => p,
        None => return false,
    };
    let behind_dir = Hex::opposite_direction(direction);
    let behind1 = jarl.position.neighbor(behind_dir);
    let behind2 = behind1.neighbor(behind_dir);

    let friendly_at = |hex: Hex| -> bool {
        ctx.piece_at(hex)
            .is_some_and(|p| p.player_id == Some(owner))
    };

    friendly_at(behind1) && friendly_at(behind2)
}

// ---------------------------------------------------------------------------
// Combat arithmetic (SPEC_FULL.md §4.2)
// ---------------------------------------------------------------------------

/// Resolves combat between an attacker moving into `defender`'s hex from
/// direction `d` (attacker's pre-move hex is `attacker_from`).
pub fn resolve_combat(
    ctx: &GameContext,
    attacker: &Piece,
    attacker_from: Hex,
    defender: &Piece,
    d: usize,
    has_momentum: bool,
) -> CombatResult {
    let attacker_base = attacker.strength();
    let defender_base = defender.strength();
    let momentum_bonus = if has_momentum { 1 } else { 0 };

    let attacker_owner = attacker.player_id;
    let defender_owner = defender.player_id;

    let behind_attacker = attacker_from.neighbor(Hex::opposite_direction(d));
    let inline_support = contiguous_friendly_strength(ctx, behind_attacker, Hex::opposite_direction(d), attacker_owner);

    let behind_defender = defender.position.neighbor(d);
    let bracing = contiguous_friendly_strength(ctx, behind_defender, d, defender_owner);

    let attack_total = attacker_base + momentum_bonus + inline_support;
    let defense_total = defender_base + bracing;
    let pushed = attack_total > defense_total;

    CombatResult {
        attacker_base,
        defender_base,
        momentum_bonus,
        inline_support,
        bracing,
        attack_total,
        defense_total,
        pushed,
        push_direction: if pushed { Some(d) } else { None },
    }
}

/// Sums base strength of contiguous pieces owned by `owner`, walking from
/// `start` in `direction`. Stops at the first empty hex, enemy piece,
/// shield, or board edge.
fn contiguous_friendly_strength(
    ctx: &GameContext,
    start: Hex,
    direction: usize,
    owner: Option<PlayerId>,
) -> i32 {
    let Some(owner) = owner else { return 0 };
    let mut total = 0;
    let mut cur = start;
    loop {
        if !cur.is_on_board(ctx.config.board_radius) {
            break;
        }
        match ctx.piece_at(cur) {
            Some(p) if p.kind != PieceKind::Shield && p.player_id == Some(owner) => {
                total += p.strength();
                cur = cur.neighbor(direction);
            }
            _ => break,
        }
    }
    total
}

// ---------------------------------------------------------------------------
// Push-chain resolution (SPEC_FULL.md §4.3)
// ---------------------------------------------------------------------------

/// The outcome of resolving a push chain.
pub struct PushOutcome {
    pub terminator: ChainTerminator,
    /// Events in increasing `depth` order, for staggered client animation.
    pub events: Vec<GameEvent>,
}

/// Resolves the push chain starting at `defender_hex` in direction `d`,
/// mutating `ctx` in place. On success the attacker is moved into
/// `defender_hex` unless the throne-compression rule keeps it in place.
pub fn resolve_push(
    ctx: &mut GameContext,
    attacker_id: PieceId,
    defender_hex: Hex,
    d: usize,
) -> PushOutcome {
    let radius = ctx.config.board_radius;

    // Identify the chain (ordered outward from the defender) and its
    // terminator without mutating yet.
    let mut chain: Vec<PieceId> = vec![ctx.piece_at(defender_hex).expect("defender piece present").id];
    let mut cur = defender_hex;
    let terminator;
    loop {
        let next = cur.neighbor(d);
        if !next.is_on_board(radius) {
            terminator = ChainTerminator::Edge;
            break;
        }
        if ctx.holes.contains(&next) {
            terminator = ChainTerminator::Hole;
            break;
        }
        let last_kind = ctx.piece(*chain.last().unwrap()).unwrap().kind;
        if next == THRONE && last_kind == PieceKind::Warrior {
            terminator = ChainTerminator::Throne;
            break;
        }
        match ctx.piece_at(next) {
            Some(p) => {
                chain.push(p.id);
                cur = next;
            }
            None => {
                terminator = ChainTerminator::Empty;
                break;
            }
        }
    }

    let mut events = Vec::new();
    let mut depth = 0u32;

    match terminator {
        ChainTerminator::Empty => {
            // Every chain piece shifts one hex in d, from the far end
            // inward so no intermediate overlap occurs.
            for &piece_id in chain.iter().rev() {
                let from = ctx.piece(piece_id).unwrap().position;
                let to = from.neighbor(d);
                ctx.pieces.iter_mut().find(|p| p.id == piece_id).unwrap().position = to;
                events.push(GameEvent::Push { piece_id, from, to, depth });
                depth += 1;
            }
            move_attacker(ctx, attacker_id, defender_hex);
        }
        ChainTerminator::Edge | ChainTerminator::Hole => {
            let last_id = *chain.last().unwrap();
            let cause = if terminator == ChainTerminator::Edge {
                EliminationCause::Edge
            } else {
                EliminationCause::Hole
            };
            let eliminated_owner = ctx.piece(last_id).unwrap().player_id;
            ctx.pieces.retain(|p| p.id != last_id);
            events.push(GameEvent::Eliminated {
                piece_id: last_id,
                player_id: eliminated_owner,
                cause,
            });
            depth += 1;
            // Remaining chain pieces (all but the eliminated last) shift
            // one hex in d, far end inward.
            for &piece_id in chain.iter().rev().skip(1) {
                let from = ctx.piece(piece_id).unwrap().position;
                let to = from.neighbor(d);
                ctx.pieces.iter_mut().find(|p| p.id == piece_id).unwrap().position = to;
                events.push(GameEvent::Push { piece_id, from, to, depth });
                depth += 1;
            }
            move_attacker(ctx, attacker_id, defender_hex);
        }
        ChainTerminator::Throne => {
            // The chain compresses against the throne. The piece adjacent
            // to it cannot advance; by the no-two-pieces-per-hex invariant
            // that pins every piece behind it too, so the whole chain
            // stays put and the attacker does not advance (confirmed by
            // the chain-length-1 worked example in SPEC_FULL.md §8).
        }
    }

    PushOutcome { terminator, events }
}

fn move_attacker(ctx: &mut GameContext, attacker_id: PieceId, to: Hex) {
    ctx.pieces
        .iter_mut()
        .find(|p| p.id == attacker_id)
        .unwrap()
        .position = to;
}

// ---------------------------------------------------------------------------
// Post-move pipeline (SPEC_FULL.md §4.4): victories, elimination, rotation,
// starvation trigger.
// ---------------------------------------------------------------------------

/// Rounds-since-elimination values (starting at 10, then every 5) that
/// trigger a starvation phase.
pub fn is_starvation_round(rounds_since_elimination: u64) -> bool {
    rounds_since_elimination == 10 || (rounds_since_elimination > 10 && (rounds_since_elimination - 10) % 5 == 0)
}

/// The result of running the post-move pipeline.
pub struct PipelineOutcome {
    pub events: Vec<GameEvent>,
    pub ended: bool,
    pub starvation_triggered: bool,
}

/// Runs the full post-move pipeline described in SPEC_FULL.md §4.4, steps
/// 1-6, after a move (or a skipped turn, when `mover_id` is `None`) has
/// already been applied to `ctx`.
pub fn run_post_move_pipeline(
    ctx: &mut GameContext,
    mover_id: Option<PieceId>,
    had_elimination_this_turn: bool,
) -> PipelineOutcome {
    let mut events = Vec::new();

    // 1. Throne victory check.
    if let Some(mover_id) = mover_id
        && let Some(mover) = ctx.piece(mover_id)
        && mover.kind == PieceKind::Jarl
        && mover.position == THRONE
    {
        let winner = mover.player_id;
        ctx.winner_id = winner;
        ctx.win_condition = Some(WinCondition::Throne);
        events.push(GameEvent::GameEnded {
            winner_id: winner,
            win_condition: WinCondition::Throne,
        });
        return PipelineOutcome { events, ended: true, starvation_triggered: false };
    }

    // 2. Elimination check: any player whose Jarl is gone is eliminated,
    // and their remaining pieces are removed.
    let eliminated_players: Vec<PlayerId> = ctx
        .players
        .iter()
        .filter(|p| !p.is_eliminated && ctx.jarl_of(p.id).is_none())
        .map(|p| p.id)
        .collect();
    for player_id in &eliminated_players {
        if let Some(p) = ctx.player_mut(*player_id) {
            p.is_eliminated = true;
        }
        ctx.pieces.retain(|piece| piece.player_id != Some(*player_id));
    }

    // 3. Last-standing check.
    let remaining: Vec<PlayerId> = ctx.non_eliminated_players().map(|p| p.id).collect();
    if remaining.len() == 1 {
        let winner = remaining[0];
        ctx.winner_id = Some(winner);
        ctx.win_condition = Some(WinCondition::LastStanding);
        events.push(GameEvent::GameEnded {
            winner_id: Some(winner),
            win_condition: WinCondition::LastStanding,
        });
        return PipelineOutcome { events, ended: true, starvation_triggered: false };
    }
    if remaining.is_empty() {
        // Defensive: every player eliminated simultaneously. No winner.
        ctx.win_condition = None;
        return PipelineOutcome { events, ended: true, starvation_triggered: false };
    }

    // 4. Round / first-player rotation.
    let had_elimination = had_elimination_this_turn || !eliminated_players.is_empty();
    let seat_order = ctx.seat_order();
    let advanced_round = advance_current_player(ctx, &seat_order);
    if advanced_round {
        ctx.round_number += 1;
        ctx.first_player_index = (ctx.first_player_index + 1) % seat_order.len().max(1);

        // 5. Jarl grace-period tracking, run once per round.
        update_warrior_grace_periods(ctx);
    }
    if had_elimination {
        ctx.rounds_since_elimination = 0;
    } else if advanced_round {
        ctx.rounds_since_elimination += 1;
    }

    if let Some(next) = ctx.current_player_id {
        events.push(GameEvent::TurnEnded {
            next_player_id: next,
            round_number: ctx.round_number,
        });
    }

    // 6. Starvation trigger.
    let starvation_triggered = is_starvation_round(ctx.rounds_since_elimination);
    if starvation_triggered {
        events.push(GameEvent::StarvationTriggered);
    }

    PipelineOutcome { events, ended: false, starvation_triggered }
}

/// Advances `current_player_id` to the next non-eliminated player in seat
/// order. Returns `true` if doing so wrapped back to (at or before) the
/// first seat, i.e. a new round began.
fn advance_current_player(ctx: &mut GameContext, seat_order: &[PlayerId]) -> bool {
    if seat_order.is_empty() {
        return false;
    }
    let current_idx = ctx
        .current_player_id
        .and_then(|id| seat_order.iter().position(|&p| p == id))
        .unwrap_or(0);

    let mut idx = current_idx;
    let mut wrapped = false;
    for _ in 0..seat_order.len() {
        idx = (idx + 1) % seat_order.len();
        if idx <= current_idx {
            wrapped = true;
        }
        let candidate = seat_order[idx];
        if ctx.player(candidate).is_some_and(|p| !p.is_eliminated) {
            ctx.current_player_id = Some(candidate);
            return wrapped;
        }
    }
    wrapped
}

/// At the end of each round, tracks how long a player has had zero
/// Warriors; resets to `None` as soon as they regain one.
fn update_warrior_grace_periods(ctx: &mut GameContext) {
    let player_ids: Vec<PlayerId> = ctx.players.iter().map(|p| p.id).collect();
    for player_id in player_ids {
        let has_warriors = ctx.warriors_of(player_id).next().is_some();
        if let Some(player) = ctx.player_mut(player_id) {
            if player.is_eliminated {
                continue;
            }
            if has_warriors {
                player.rounds_since_last_warrior = None;
            } else {
                player.rounds_since_last_warrior =
                    Some(player.rounds_since_last_warrior.unwrap_or(0) + 1);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Starvation (SPEC_FULL.md §4.4 starvation candidate selection/resolution)
// ---------------------------------------------------------------------------

/// For each non-eliminated player, the Warriors at maximum distance from
/// the throne (ties preserved). Players with zero Warriors get an empty
/// list.
pub fn compute_starvation_candidates(ctx: &GameContext) -> HashMap<PlayerId, Vec<PieceId>> {
    let mut out = HashMap::new();
    for player in ctx.non_eliminated_players() {
        let warriors: Vec<&Piece> = ctx.warriors_of(player.id).collect();
        if warriors.is_empty() {
            out.insert(player.id, Vec::new());
            continue;
        }
        let max_dist = warriors
            .iter()
            .map(|w| w.position.distance_from_throne())
            .max()
            .unwrap();
        let candidates = warriors
            .into_iter()
            .filter(|w| w.position.distance_from_throne() == max_dist)
            .map(|w| w.id)
            .collect();
        out.insert(player.id, candidates);
    }
    out
}

/// Resolves starvation once all choices are in (or the timeout elapsed and
/// missing choices were auto-filled with the first candidate by the
/// caller). Removes the chosen piece per player, tracks the Warrior
/// grace period, eliminates Jarls who have starved for 5+ rounds with
/// zero Warriors, and resets `rounds_since_elimination`.
pub fn resolve_starvation(
    ctx: &mut GameContext,
    choices: &HashMap<PlayerId, PieceId>,
) -> Vec<GameEvent> {
    let mut events = Vec::new();

    for (&player_id, candidates) in ctx.starvation_candidates.clone().iter() {
        if candidates.is_empty() {
            continue;
        }
        let chosen = choices
            .get(&player_id)
            .filter(|id| candidates.contains(id))
            .copied()
            .unwrap_or(candidates[0]);

        ctx.pieces.retain(|p| p.id != chosen);
        events.push(GameEvent::Eliminated {
            piece_id: chosen,
            player_id: Some(player_id),
            cause: EliminationCause::Starvation,
        });
    }

    update_warrior_grace_periods_post_starvation(ctx, &mut events);

    ctx.rounds_since_elimination = 0;
    ctx.starvation_candidates.clear();
    ctx.starvation_choices.clear();
    events.push(GameEvent::StarvationResolved);

    events
}

fn update_warrior_grace_periods_post_starvation(ctx: &mut GameContext, events: &mut Vec<GameEvent>) {
    let player_ids: Vec<PlayerId> = ctx.players.iter().map(|p| p.id).collect();
    for player_id in player_ids {
        let has_warriors = ctx.warriors_of(player_id).next().is_some();
        let should_starve_jarl = {
            let Some(player) = ctx.player_mut(player_id) else { continue };
            if player.is_eliminated {
                continue;
            }
            if has_warriors {
                player.rounds_since_last_warrior = None;
                false
            } else {
                let rounds = player.rounds_since_last_warrior.unwrap_or(0) + 1;
                player.rounds_since_last_warrior = Some(rounds);
                rounds >= 5
            }
        };
        if should_starve_jarl && !has_warriors {
            if let Some(jarl) = ctx.jarl_of(player_id) {
                let jarl_id = jarl.id;
                ctx.pieces.retain(|p| p.id != jarl_id);
                if let Some(player) = ctx.player_mut(player_id) {
                    player.is_eliminated = true;
                }
                events.push(GameEvent::JarlStarved { player_id });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config(radius: i32) -> GameConfig {
        GameConfig {
            player_count: 2,
            board_radius: radius,
            warrior_count: 4,
            turn_timer_ms: None,
            terrain: Terrain::Calm,
        }
    }

    fn piece(kind: PieceKind, player: Option<PlayerId>, pos: Hex) -> Piece {
        Piece { id: Uuid::new_v4(), kind, player_id: player, position: pos }
    }

    #[test]
    fn warrior_cannot_enter_throne() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        ctx.players.push(Player::new(a, "A".into(), false, "red".into()));
        ctx.current_player_id = Some(a);
        let warrior = piece(PieceKind::Warrior, Some(a), Hex::new(1, 0));
        let wid = warrior.id;
        ctx.pieces.push(warrior);

        let cmd = MoveCommand { piece_id: wid, destination: THRONE };
        let legality = check_move_legality(&ctx, &cmd, a, true);
        assert_eq!(legality.reason, Some(RuleRejection::WarriorCannotEnterThrone));
    }

    #[test]
    fn jarl_two_hex_needs_draft() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        ctx.players.push(Player::new(a, "A".into(), false, "red".into()));
        ctx.current_player_id = Some(a);
        let jarl = piece(PieceKind::Jarl, Some(a), Hex::new(2, 0));
        let jid = jarl.id;
        ctx.pieces.push(jarl);

        let cmd = MoveCommand { piece_id: jid, destination: THRONE };
        let legality = check_move_legality(&ctx, &cmd, a, true);
        assert_eq!(legality.reason, Some(RuleRejection::JarlNeedsDraftForTwoHex));

        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(3, 0)));
        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(4, 0)));
        let legality = check_move_legality(&ctx, &cmd, a, true);
        assert!(legality.valid);
        assert!(legality.has_momentum);
    }

    #[test]
    fn throne_crossing_truncates_destination() {
        // Matches SPEC_FULL.md §8 scenario 1: Jarl at (2,0), drafters at
        // (3,0)/(4,0) [behind, further from throne], moving two hexes
        // toward (0,0) through the throne.
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        ctx.players.push(Player::new(a, "A".into(), false, "red".into()));
        ctx.current_player_id = Some(a);
        let jarl = piece(PieceKind::Jarl, Some(a), Hex::new(2, 0));
        let jid = jarl.id;
        ctx.pieces.push(jarl);
        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(3, 0)));
        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(4, 0)));

        // A nominal 2-hex destination beyond the throne isn't reachable on
        // a radius-3 board directly, but the direction/line still crosses
        // the throne at distance 2 from (2,0) in the (-1,0) direction: that
        // destination IS exactly the throne, so this also covers the
        // straightforward "destination == throne" case.
        let cmd = MoveCommand { piece_id: jid, destination: Hex::new(0, 0) };
        let legality = check_move_legality(&ctx, &cmd, a, true);
        assert!(legality.valid);
        assert_eq!(legality.adjusted_destination, Some(THRONE));
    }

    #[test]
    fn combat_basic_arithmetic() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let attacker = piece(PieceKind::Warrior, Some(a), Hex::new(2, 0));
        let support = piece(PieceKind::Warrior, Some(a), Hex::new(3, 0));
        let defender = piece(PieceKind::Warrior, Some(b), Hex::new(1, 0));
        let attacker_id = attacker.id;
        ctx.pieces.push(attacker);
        ctx.pieces.push(support);
        ctx.pieces.push(defender.clone());

        let d = Hex::new(2, 0).direction_to(Hex::new(1, 0)).unwrap();
        let result = resolve_combat(&ctx, ctx.piece(attacker_id).unwrap(), Hex::new(2, 0), &defender, d, false);
        assert_eq!(result.attack_total, 2); // 1 base + 1 inline support
        assert_eq!(result.defense_total, 1);
        assert!(result.pushed);
    }

    #[test]
    fn push_to_empty_hex() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let attacker = piece(PieceKind::Warrior, Some(a), Hex::new(2, 0));
        let defender = piece(PieceKind::Warrior, Some(b), Hex::new(1, 0));
        let attacker_id = attacker.id;
        ctx.pieces.push(attacker);
        ctx.pieces.push(defender);

        let d = Hex::new(2, 0).direction_to(Hex::new(1, 0)).unwrap();
        let outcome = resolve_push(&mut ctx, attacker_id, Hex::new(1, 0), d);
        assert_eq!(outcome.terminator, ChainTerminator::Empty);
        assert_eq!(ctx.piece(attacker_id).unwrap().position, Hex::new(1, 0));
    }

    #[test]
    fn push_off_edge_eliminates_last() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(2));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let attacker = piece(PieceKind::Warrior, Some(a), Hex::new(0, 0));
        let defender = piece(PieceKind::Warrior, Some(b), Hex::new(1, 0));
        let supporter = piece(PieceKind::Warrior, Some(b), Hex::new(2, 0));
        let attacker_id = attacker.id;
        let supporter_id = supporter.id;
        ctx.pieces.push(attacker);
        ctx.pieces.push(defender);
        ctx.pieces.push(supporter);

        let d = Hex::new(0, 0).direction_to(Hex::new(1, 0)).unwrap();
        let outcome = resolve_push(&mut ctx, attacker_id, Hex::new(1, 0), d);
        assert_eq!(outcome.terminator, ChainTerminator::Edge);
        // The supporter (last in chain, at the edge) is eliminated.
        assert!(ctx.piece(supporter_id).is_none());
        assert_eq!(ctx.piece(attacker_id).unwrap().position, Hex::new(1, 0));
    }

    #[test]
    fn throne_compression_freezes_chain() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let attacker = piece(PieceKind::Warrior, Some(a), Hex::new(2, 0));
        let defender = piece(PieceKind::Warrior, Some(b), Hex::new(1, 0));
        let attacker_id = attacker.id;
        let defender_id = defender.id;
        ctx.pieces.push(attacker);
        ctx.pieces.push(defender);

        let d = Hex::new(2, 0).direction_to(Hex::new(1, 0)).unwrap();
        let outcome = resolve_push(&mut ctx, attacker_id, Hex::new(1, 0), d);
        assert_eq!(outcome.terminator, ChainTerminator::Throne);
        assert_eq!(ctx.piece(attacker_id).unwrap().position, Hex::new(2, 0));
        assert_eq!(ctx.piece(defender_id).unwrap().position, Hex::new(1, 0));
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn starvation_round_schedule() {
        assert!(!is_starvation_round(9));
        assert!(is_starvation_round(10));
        assert!(!is_starvation_round(11));
        assert!(is_starvation_round(15));
        assert!(is_starvation_round(20));
        assert!(!is_starvation_round(21));
    }

    #[test]
    fn starvation_candidates_pick_farthest() {
        let mut ctx = GameContext::new(Uuid::new_v4(), config(3));
        let a = Uuid::new_v4();
        ctx.players.push(Player::new(a, "A".into(), false, "red".into()));
        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(1, 0)));
        ctx.pieces.push(piece(PieceKind::Warrior, Some(a), Hex::new(3, 0)));
        let candidates = compute_starvation_candidates(&ctx);
        let far = ctx
            .pieces
            .iter()
            .find(|p| p.position == Hex::new(3, 0))
            .unwrap()
            .id;
        assert_eq!(candidates[&a], vec![far]);
    }
}
