//! The control loop and failover state machine: suspicion detection,
//! spare selection, resurrection orchestration, and the periodic
//! Supervisor that ties them together (spec §4.4-§4.5).

pub mod executors;
pub mod refresher;
pub mod resurrection;
pub mod spare;
pub mod supervisor;
pub mod suspicion;

pub use executors::Worker;
pub use refresher::InventoryRefresher;
pub use resurrection::{orchestrate_resurrection, Resurrector};
pub use spare::select_spare;
pub use supervisor::Supervisor;
pub use suspicion::get_suspicious_hypervisors;
