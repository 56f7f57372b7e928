//! Grid geometry: bounds, clamping, and spawn placement.

use gridcast_protocol::{Direction, ParticipantId, Position};

/// Size of the shared grid.
///
/// Valid positions are `[0, width) × [0, height)`. Dimensions below 1 are
/// treated as 1, so a degenerate grid is a single cell rather than a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    pub width: i32,
    pub height: i32,
}

impl GridConfig {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn max_x(&self) -> i32 {
        self.width.max(1) - 1
    }

    fn max_y(&self) -> i32 {
        self.height.max(1) - 1
    }

    /// Clamps each axis independently into the grid.
    pub fn clamp(&self, position: Position) -> Position {
        Position::new(
            position.x.clamp(0, self.max_x()),
            position.y.clamp(0, self.max_y()),
        )
    }

    /// Returns `true` if `position` lies inside the grid.
    pub fn contains(&self, position: Position) -> bool {
        self.clamp(position) == position
    }

    /// Moves one cell in `direction`, stopping at the edge.
    pub fn step(&self, from: Position, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        self.clamp(Position::new(
            from.x.saturating_add(dx),
            from.y.saturating_add(dy),
        ))
    }

    /// Deterministic starting cell for a participant.
    ///
    /// Row-major from the top-left corner: id 1 lands on `(0, 0)`, id 2 on
    /// `(1, 0)`, and so on, wrapping to the next row at `width` and back to
    /// the top after `width × height` joins.
    pub fn spawn_position(&self, participant: ParticipantId) -> Position {
        let width = i64::from(self.width.max(1));
        let height = i64::from(self.height.max(1));
        let index = i64::from(participant.0.saturating_sub(1));

        // Both results are below an i32 dimension, so the casts are lossless.
        let x = (index % width) as i32;
        let y = ((index / width) % height) as i32;
        Position::new(x, y)
    }
}

impl Default for GridConfig {
    /// A 40 × 20 grid.
    fn default() -> Self {
        Self::new(40, 20)
    }
}
