pub mod config;
pub mod id;
pub mod reg;

pub use config::{Config, ConfigError};
pub use id::{FuncId, Height, ThreadId};
pub use reg::{Access, Family, Reg, Slot, FLOAT_SLOTS, INT_SLOTS};
