pub mod debug;
pub mod dispatcher;
pub mod elevator;
pub mod generator;
pub mod snapshot;
pub mod strategy;
pub mod waiting;
