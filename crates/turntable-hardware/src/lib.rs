pub mod debounce;
pub mod events;
pub mod motor;
pub mod pins;
pub mod reactor;

pub use events::{InputEvent, MotorCommand};
pub use motor::{MotorDirection, MotorDriver};
pub use pins::{Board, DigitalInput, DigitalOutput, Level, PinError, Pull, PwmOutput};
pub use reactor::InputReactor;
