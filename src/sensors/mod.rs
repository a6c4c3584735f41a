//! Sensor module - register bus, drivers and simulations

pub mod bus;
pub mod environmental;
pub mod motion;
mod manager;
mod simulator;
mod traits;

pub use bus::RegisterBus;
#[cfg(feature = "hardware")]
pub use bus::LinuxI2cBus;
pub use environmental::{Bme688, EnvironmentalConfig};
pub use manager::SensorManager;
pub use motion::Bmi270;
pub use simulator::{SimulatedBme688Bus, SimulatedBmi270Bus};
pub use traits::{Reading, SensorHealth, SensorSource, SensorStatus};
