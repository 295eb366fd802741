use std::fmt;

use super::direction::Direction;

/// An external button press: floor plus requested travel direction.
/// Ordering is floor-major so calls sort bottom-to-top in ordered sets.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HallCall {
    pub floor: u8,
    pub direction: Direction,
}

impl HallCall {
    pub fn new(floor: u8, direction: Direction) -> Self {
        HallCall { floor, direction }
    }
}

impl fmt::Display for HallCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HallCall{{{},{}}}", self.floor, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_floor_major() {
        let mut calls = vec![
            HallCall::new(5, Direction::Down),
            HallCall::new(2, Direction::Up),
            HallCall::new(5, Direction::Up),
        ];
        calls.sort();
        assert_eq!(calls[0].floor, 2);
        assert_eq!(calls[1], HallCall::new(5, Direction::Up));
        assert_eq!(calls[2], HallCall::new(5, Direction::Down));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(HallCall::new(3, Direction::Up), HallCall::new(3, Direction::Up));
        assert_ne!(HallCall::new(3, Direction::Up), HallCall::new(3, Direction::Down));
    }
}
