use std::fmt;

use super::direction::Direction;

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Passenger {
    pub id: usize,
    pub start_floor: u8,
    pub target_floor: u8,
    pub direction: Direction,
}

impl Passenger {
    pub fn new(id: usize, start_floor: u8, target_floor: u8) -> Self {
        Passenger {
            id,
            start_floor,
            target_floor,
            direction: Direction::between(start_floor, target_floor),
        }
    }
}

impl fmt::Display for Passenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passenger-{} [{} -> {}]", self.id, self.start_floor, self.target_floor)
    }
}
