pub mod error;
pub mod protocol;
pub mod state;

pub use error::CoreError;
pub use protocol::{ClientCommand, Command, Frame};
pub use state::{AppState, Settings, StateChange, StateKey};
