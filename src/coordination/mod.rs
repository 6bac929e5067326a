pub mod arbiter;
pub mod context;
pub mod corner_fsm;
pub mod fuser;
pub mod station_fsm;
pub mod timer;

pub use arbiter::CollisionArbiter;
pub use context::FsmContext;
pub use corner_fsm::CornerFsm;
pub use fuser::CepFuser;
pub use station_fsm::StationFsm;
