#![deny(clippy::expect_used)]
#![deny(clippy::unwrap_used)]

pub mod camera;
pub mod car_temp;
pub mod config;
pub mod error;
pub mod network;
pub mod server;
pub mod system;
pub mod weather;

pub use error::{OurError, OurResult};
