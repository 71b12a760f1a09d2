//! Live video relay and still capture subsystem.
//!
//! The supervisor owns the single external capture process and feeds its
//! MJPEG output through the demultiplexer into the broadcast hub. Still
//! capture runs a separate one-shot process, mutually exclusive with the
//! stream at the sensor, and persists its results in the catalog.

pub mod catalog;
pub mod demux;
pub mod hub;
pub mod status;
pub mod still;
pub mod supervisor;

pub use catalog::{StillCatalog, StillRecord};
pub use demux::FrameDemuxer;
pub use hub::BroadcastHub;
pub use status::CameraStatus;
pub use still::{StillCapture, StillImage};
pub use supervisor::StreamSupervisor;
