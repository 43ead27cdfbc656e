pub mod app;

pub use app::bridge::batch::{BatchRunner, TargetOutcome};
pub use app::bridge::registry::DeviceRegistry;
pub use app::bridge::session::{BridgeSession, TransferDirection};
pub use app::config::BridgeConfig;
pub use app::error::{BridgeError, ErrorCode, Remediation};
pub use app::models::{Device, DeviceProfile, DeviceStatus};
