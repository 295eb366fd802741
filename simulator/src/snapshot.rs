use std::fmt;

use shared_resources::direction::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevatorStatus {
    Idle,
    Moving,
    DoorsOpen,
    LoadFull,
}

impl fmt::Display for ElevatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevatorStatus::Idle => write!(f, "IDLE"),
            ElevatorStatus::Moving => write!(f, "MOVING"),
            ElevatorStatus::DoorsOpen => write!(f, "DOORS_OPEN"),
            ElevatorStatus::LoadFull => write!(f, "LOAD_FULL"),
        }
    }
}

/// Consistent point-in-time view of one car, produced under the car's lock.
/// The furthest stops include onboard passenger destinations so the
/// dispatcher sees the real travel envelope; 0 means no work on that side.
#[derive(Debug, Clone)]
pub struct ElevatorSnapshot {
    pub id: usize,
    pub current_floor: u8,
    pub direction: Direction,
    pub status: ElevatorStatus,
    pub load: usize,
    pub capacity: usize,
    pub planned_stops: usize,
    pub furthest_up_stop: u8,
    pub furthest_down_stop: u8,
}

impl ElevatorSnapshot {
    pub fn has_up_work(&self) -> bool {
        self.furthest_up_stop > 0
    }

    pub fn has_down_work(&self) -> bool {
        self.furthest_down_stop > 0
    }
}
