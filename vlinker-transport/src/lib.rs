pub mod audit;
pub mod error;
pub mod frame;
pub mod isotp;
pub mod link;
pub mod manager;
pub mod options;
pub mod utils;

pub use crate::error::{DeviceError, TransportError};
pub use crate::isotp::transact;
pub use crate::link::{SerialLink, SerialLinkExt, SerialPortLink, ScriptedLink, discover_device, list_devices};
pub use crate::manager::{ConnectionManager, ConnectionStatus, ManagerError, ProbeResult};
pub use crate::options::{ReceiveMode, TransportOptions};
pub use crate::utils::{Hex, ShortHex, SpaceHex};
