pub mod group;
pub mod runner;

pub use group::{spawn_detached, ProcessGroup};
pub use runner::run_capture;
