use std::io::{stdout, Stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver};
use crossterm::{cursor, terminal, ExecutableCommand, Result};
use shared_resources::clock;
use shared_resources::direction::Direction;
use shared_resources::passenger::Passenger;

use crate::dispatcher::Dispatcher;
use crate::elevator::Elevator;
use crate::generator::SimulationControl;
use crate::snapshot::ElevatorStatus;

const REDRAW_PERIOD: Duration = Duration::from_millis(250);
const PREVIEW_LIMIT: usize = 3;

/// In-place terminal status table: waiting passengers per floor, one column
/// marker per car, and a detail row per car. Read-only consumer of
/// snapshots, counts and best-effort peeks.
pub fn main(
    dispatcher: Arc<Dispatcher>,
    elevators: Vec<Arc<Elevator>>,
    control: Arc<SimulationControl>,
    shutdown_rx: Receiver<()>,
) -> Result<()> {
    let mut stdout = stdout();

    loop {
        select! {
            recv(shutdown_rx) -> _ => {
                printstatus(&mut stdout, &dispatcher, &elevators, &control, true)?;
                return Ok(())
            },
            default(REDRAW_PERIOD) => {
                printstatus(&mut stdout, &dispatcher, &elevators, &control, false)?;
            },
        }
    }
}

fn status_char(status: ElevatorStatus) -> char {
    match status {
        ElevatorStatus::Idle => 'I',
        ElevatorStatus::Moving => 'M',
        ElevatorStatus::DoorsOpen => 'D',
        ElevatorStatus::LoadFull => 'F',
    }
}

fn waiting_cell(count: usize, preview: &[Passenger]) -> String {
    if count == 0 {
        return String::new();
    }
    let ids: Vec<String> = preview.iter().map(|p| format!("P{}", p.id)).collect();
    let more = if count > preview.len() { format!(" +{}", count - preview.len()) } else { String::new() };
    format!("{}: {}{}", count, ids.join(" "), more)
}

fn passengers_cell(onboard: &[Passenger], load: usize) -> String {
    if onboard.is_empty() {
        return String::new();
    }
    let ids: Vec<String> = onboard.iter().map(|p| format!("P{}>{}", p.id, p.target_floor)).collect();
    let more = if load > onboard.len() { format!(" +{}", load - onboard.len()) } else { String::new() };
    format!("{}{}", ids.join(" "), more)
}

fn printstatus(
    stdout: &mut Stdout,
    dispatcher: &Dispatcher,
    elevators: &[Arc<Elevator>],
    control: &Arc<SimulationControl>,
    finished: bool,
) -> Result<()> {
    let total_floors = dispatcher.total_floors();
    let mut out = String::new();

    out.push_str("+-------+------------------+------------------+------------------+\n");
    out.push_str(&format!(
        "| {0:<5} | {1:<16} | {2:<16} | {3:<16} |\n",
        "FLOOR", "WAIT UP", "WAIT DOWN", "CARS"
    ));
    out.push_str("+-------+------------------+------------------+------------------+\n");
    for floor in (1..=total_floors).rev() {
        let mut cars = String::new();
        for e in elevators {
            if e.visual_pos().round() as u8 == floor {
                cars.push_str(&format!("[{}:{}]", e.id(), status_char(e.snapshot().status)));
            }
        }
        let up = waiting_cell(
            dispatcher.waiting_count(floor, Direction::Up),
            &dispatcher.peek_waiting(floor, Direction::Up, PREVIEW_LIMIT),
        );
        let down = waiting_cell(
            dispatcher.waiting_count(floor, Direction::Down),
            &dispatcher.peek_waiting(floor, Direction::Down, PREVIEW_LIMIT),
        );
        out.push_str(&format!(
            "| {0:<5} | {1:<16} | {2:<16} | {3:<16} |\n",
            floor, up, down, cars
        ));
    }
    out.push_str("+-------+------------------+------------------+------------------+\n");
    out.push('\n');

    out.push_str("+------+---------+-----------+------------+--------+--------+----------------------+\n");
    out.push_str(&format!(
        "| {0:<4} | {1:<7} | {2:<9} | {3:<10} | {4:<6} | {5:<6} | {6:<20} |\n",
        "CAR", "FLOOR", "DIRECTION", "STATUS", "LOAD", "STOPS", "ONBOARD"
    ));
    out.push_str("+------+---------+-----------+------------+--------+--------+----------------------+\n");
    for e in elevators {
        let s = e.snapshot();
        let onboard = passengers_cell(&e.passengers_snapshot(PREVIEW_LIMIT), s.load);
        out.push_str(&format!(
            "| {0:<4} | {1:<7.1} | {2:<9} | {3:<10} | {4:>3}/{5:<2} | {6:<6} | {7:<20} |\n",
            s.id,
            e.visual_pos(),
            s.direction.to_string(),
            s.status.to_string(),
            s.load,
            s.capacity,
            s.planned_stops,
            onboard
        ));
    }
    out.push_str("+------+---------+-----------+------------+--------+--------+----------------------+\n");

    out.push_str(&format!(
        "generated {}/{} | waiting {} | speed {:.1}x{}{}\n",
        control.generated_count(),
        control.passenger_limit(),
        dispatcher.total_waiting(),
        clock::speed(),
        if clock::is_paused() { " | PAUSED" } else { "" },
        if finished { " | FINISHED" } else { "" }
    ));

    let lines = out.lines().count() as u16;

    stdout.execute(terminal::Clear(terminal::ClearType::FromCursorDown))?;
    write!(stdout, "{}", out)?;
    stdout.flush()?;
    if !finished {
        stdout.execute(cursor::MoveUp(lines))?;
    }
    Ok(())
}
