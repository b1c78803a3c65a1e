pub mod agent;
pub mod controller;
pub mod discovery;
pub mod regions;
pub mod trail_alarm;

pub use agent::{AgentDeployment, AgentSys};
pub use controller::{ControllerSys, MonitorResource, Outcome};
pub use trail_alarm::TrailAlarmSys;
