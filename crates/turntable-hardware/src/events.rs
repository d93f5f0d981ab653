use crate::motor::MotorDirection;

/// Discrete, debounced events from the physical controls, emitted on one
/// channel and consumed by a single dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    HingeClosed,
    HingeOpen,
    ButtonDown,
    ButtonUp,
    /// Control encoder turned with the button up. +1 cw, -1 ccw.
    FreeRotate(i8),
    /// Control encoder turned while its button was held.
    DownRotate(i8),
    /// Short isolated press of the encoder button.
    ShortPress,
    MotorStall,
}

/// Commands into the motor task. The task is the motor driver's only
/// owner; everything else talks to it through this channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    SetDirection(MotorDirection),
    SetSpeed(u8),
}
