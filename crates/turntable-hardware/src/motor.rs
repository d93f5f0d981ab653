use crate::pins::{DigitalOutput, Level, PinError, PwmOutput};

pub const PWM_FREQUENCY_HZ: u32 = 1_000;
pub const MAX_SPEED_PERCENT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Reverse,
    Stop,
}

/// Drives the platter motor: two mutually exclusive direction outputs and a
/// fixed-frequency PWM speed line.
pub struct MotorDriver<O: DigitalOutput, P: PwmOutput> {
    forward: O,
    reverse: O,
    pwm: P,
}

impl<O: DigitalOutput, P: PwmOutput> MotorDriver<O, P> {
    pub fn new(forward: O, reverse: O, pwm: P) -> Self {
        Self {
            forward,
            reverse,
            pwm,
        }
    }

    pub fn set_direction(&mut self, direction: MotorDirection) -> Result<(), PinError> {
        let (fwd, rev) = match direction {
            MotorDirection::Forward => (Level::High, Level::Low),
            MotorDirection::Reverse => (Level::Low, Level::High),
            MotorDirection::Stop => (Level::Low, Level::Low),
        };
        self.forward.write(fwd)?;
        self.reverse.write(rev)?;
        Ok(())
    }

    /// Duty cycle percent, clamped to [0, 100].
    pub fn set_speed(&mut self, percent: u8) -> Result<(), PinError> {
        let percent = percent.min(MAX_SPEED_PERCENT);
        self.pwm.set_duty(PWM_FREQUENCY_HZ, percent)
    }
}
