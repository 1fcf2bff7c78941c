//! Axial hex-coordinate math for the Jarls board.
//!
//! This module defines the fundamental spatial primitives used throughout
//! the engine: hex coordinates, the six neighbor directions, distance,
//! lines, and on-board tests. It is pure and stateless — it knows nothing
//! about pieces, players, or game rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An axial hex coordinate `(q, r)`. The implied cube coordinate is
/// `(q, r, s)` with `s = -q - r`, so `q + r + s = 0` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

/// The throne hex, `(0, 0)`.
pub const THRONE: Hex = Hex { q: 0, r: 0 };

/// The six neighbor directions, indexed `0..6`. Direction `d` and `(d+3)
/// mod 6` are opposites.
const DIRECTIONS: [(i32, i32); 6] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
];

impl Hex {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implied cube `s` coordinate.
    pub fn s(self) -> i32 {
        -self.q - self.r
    }

    /// Returns the opposite of direction `d` (`(d + 3) mod 6`).
    pub fn opposite_direction(d: usize) -> usize {
        (d + 3) % 6
    }

    /// The unit offset for direction `d` (`0..6`). Panics if `d >= 6`.
    pub fn direction_offset(d: usize) -> Hex {
        let (dq, dr) = DIRECTIONS[d];
        Hex::new(dq, dr)
    }

    /// Returns the neighboring hex in direction `d` (`0..6`).
    pub fn neighbor(self, d: usize) -> Hex {
        let off = Hex::direction_offset(d);
        Hex::new(self.q + off.q, self.r + off.r)
    }

    /// Returns all six neighbors, indexed by direction.
    pub fn neighbors(self) -> [Hex; 6] {
        let mut out = [Hex::new(0, 0); 6];
        for (d, slot) in out.iter_mut().enumerate() {
            *slot = self.neighbor(d);
        }
        out
    }

    /// Hex (grid) distance from `self` to `other`.
    pub fn distance(self, other: Hex) -> i32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        let ds = self.s() - other.s();
        (dq.abs() + dr.abs() + ds.abs()) / 2
    }

    /// Distance from the throne.
    pub fn distance_from_throne(self) -> i32 {
        self.distance(THRONE)
    }

    /// Returns `true` if this hex lies on a board of the given radius.
    pub fn is_on_board(self, radius: i32) -> bool {
        self.q.abs().max(self.r.abs()).max(self.s().abs()) <= radius
    }

    /// Returns `true` if this hex lies on the outer edge of a board of the
    /// given radius (distance from throne exactly equals the radius).
    pub fn is_on_edge(self, radius: i32) -> bool {
        self.q.abs().max(self.r.abs()).max(self.s().abs()) == radius
    }

    /// Returns the direction index `0..6` from `self` toward `other` if
    /// they lie on one of the six straight axial lines, else `None`.
    pub fn direction_to(self, other: Hex) -> Option<usize> {
        if self == other {
            return None;
        }
        let dq = other.q - self.q;
        let dr = other.r - self.r;
        let ds = other.s() - self.s();
        for d in 0..6 {
            let off = Hex::direction_offset(d);
            let off_s = -off.q - off.r;
            // `other` is a positive multiple of the direction's unit offset.
            if off.q != 0 && dq % off.q != 0 {
                continue;
            }
            if off.r != 0 && dr % off.r != 0 {
                continue;
            }
            let k_q = if off.q != 0 { Some(dq / off.q) } else { None };
            let k_r = if off.r != 0 { Some(dr / off.r) } else { None };
            let k = match (k_q, k_r) {
                (Some(a), Some(b)) if a == b => Some(a),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                _ => None,
            };
            if let Some(k) = k
                && k > 0
                && dq == off.q * k
                && dr == off.r * k
                && ds == off_s * k
            {
                return Some(d);
            }
        }
        None
    }

    /// Returns the ordered list of hexes strictly between `self` and
    /// `other` along a straight axial line (exclusive of both endpoints).
    /// Returns an empty vec if they are not on a straight line or are
    /// adjacent.
    pub fn line_between(self, other: Hex) -> Vec<Hex> {
        let Some(d) = self.direction_to(other) else {
            return Vec::new();
        };
        let dist = self.distance(other);
        let mut out = Vec::with_capacity((dist - 1).max(0) as usize);
        let mut cur = self;
        for _ in 1..dist {
            cur = cur.neighbor(d);
            out.push(cur);
        }
        out
    }

    /// Walks a straight line from `self` in direction `d`, yielding the
    /// hexes `self.neighbor(d)`, `self.neighbor(d).neighbor(d)`, ... up to
    /// `max_steps`, stopping early at the board boundary.
    pub fn walk(self, d: usize, radius: i32, max_steps: usize) -> Vec<Hex> {
        let mut out = Vec::with_capacity(max_steps);
        let mut cur = self;
        for _ in 0..max_steps {
            cur = cur.neighbor(d);
            if !cur.is_on_board(radius) {
                break;
            }
            out.push(cur);
        }
        out
    }

    /// Returns all hexes on a board of the given radius, in deterministic
    /// (q, then r) order.
    pub fn all_on_board(radius: i32) -> Vec<Hex> {
        let mut out = Vec::new();
        for q in -radius..=radius {
            let r_min = (-radius).max(-q - radius);
            let r_max = radius.min(-q + radius);
            for r in r_min..=r_max {
                out.push(Hex::new(q, r));
            }
        }
        out
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throne_is_origin() {
        assert_eq!(THRONE, Hex::new(0, 0));
        assert_eq!(THRONE.distance_from_throne(), 0);
    }

    #[test]
    fn opposite_directions_cancel() {
        for d in 0..6 {
            let h = Hex::new(0, 0).neighbor(d);
            let back = h.neighbor(Hex::opposite_direction(d));
            assert_eq!(back, Hex::new(0, 0));
        }
    }

    #[test]
    fn distance_matches_ring() {
        let h = Hex::new(2, -1);
        assert_eq!(Hex::new(0, 0).distance(h), 2);
    }

    #[test]
    fn on_board_and_edge() {
        let radius = 3;
        assert!(Hex::new(3, 0).is_on_board(radius));
        assert!(Hex::new(3, 0).is_on_edge(radius));
        assert!(!Hex::new(4, 0).is_on_board(radius));
        assert!(!Hex::new(0, 0).is_on_edge(radius));
    }

    #[test]
    fn direction_to_and_line_between() {
        let a = Hex::new(0, 0);
        let b = Hex::new(3, 0);
        let d = a.direction_to(b).unwrap();
        assert_eq!(a.neighbor(d).neighbor(d).neighbor(d), b);
        assert_eq!(a.line_between(b), vec![Hex::new(1, 0), Hex::new(2, 0)]);
    }

    #[test]
    fn direction_to_none_off_line() {
        let a = Hex::new(0, 0);
        let b = Hex::new(2, 1);
        assert!(a.direction_to(b).is_none());
    }

    #[test]
    fn all_on_board_count() {
        // A hex board of radius n has 3n^2 + 3n + 1 hexes.
        let radius = 3;
        let hexes = Hex::all_on_board(radius);
        assert_eq!(hexes.len(), 3 * radius as usize * radius as usize + 3 * radius as usize + 1);
        assert!(hexes.iter().all(|h| h.is_on_board(radius)));
    }
}
