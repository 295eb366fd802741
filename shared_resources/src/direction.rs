use std::fmt;

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Idle = 2,
}

impl Direction {
    /// Travel direction from one floor to another.
    pub fn between(from: u8, to: u8) -> Self {
        if to > from { Direction::Up } else { Direction::Down }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Idle => Direction::Idle,
        }
    }

    pub fn is_vertical(self) -> bool {
        self != Direction::Idle
    }

    pub fn iter_hall() -> impl Iterator<Item = Direction> {
        [Direction::Up, Direction::Down].iter().copied()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Idle => write!(f, "IDLE"),
        }
    }
}
