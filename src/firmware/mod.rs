//! Device-side firmware core: the pieces that, on real hardware, would run
//! on the MCU. Everything here is generic over small hardware-abstraction
//! traits (`DeviceLink`, `Adc`, `RadioLink`, `EepromStorage`, `ResetLine`,
//! `ProgramInterlock`, `SystemReset`, `SupplyMonitor`) so the dispatch
//! logic is exercised on a hosted target without real peripherals.

pub mod clock;
pub mod common_device;
pub mod eeprom;
pub mod framer;
pub mod link;
pub mod radio;
pub mod registry;
pub mod ringbuf;
pub mod rng;
pub mod watchdog;

pub use registry::DeviceRegistry;
