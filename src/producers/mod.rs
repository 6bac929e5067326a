pub mod bus;
pub mod nfc;
pub mod sensor;

pub use bus::EventBus;
pub use nfc::{NfcReader, ScriptedNfcReader, SimulatedNfcReader};
pub use sensor::{ExpanderSource, NullExpander, RawEdge, SensorReader};
