pub mod controller;

pub use controller::{KioskController, KioskMode};
