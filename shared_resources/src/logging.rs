use chrono::Local;

/// One-line event log shared by every actor in the simulation:
/// `[HH:MM:SS][actor][TAG] message`.
pub fn log_line(actor: &str, tag: &str, message: &str) {
    println!("[{}][{}][{}] {}", Local::now().format("%H:%M:%S"), actor, tag, message);
}
