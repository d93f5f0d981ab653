use std::sync::{Arc, Mutex};

use thiserror::Error;

/// GPIO line assignments on the device (BCM numbering, not header pins).
pub mod gpio {
    pub const MOTOR_FWD: u8 = 23;
    pub const MOTOR_REV: u8 = 24;
    // must be a PWM-capable pin
    pub const MOTOR_PWM: u8 = 12;
    /// Rotary encoder mounted on the motor shaft, used for stall detection.
    pub const MOTOR_ENC_A: u8 = 17;

    /// Front-panel control encoder.
    pub const ENC_CLK: u8 = 5;
    pub const ENC_DT: u8 = 6;
    pub const ENC_SW: u8 = 13;

    pub const HINGE: u8 = 16;
    pub const BUTTON: u8 = 26;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Inputs use internal pull-ups, so a low level means closed/pressed.
    pub fn is_active_low(&self) -> bool {
        matches!(self, Level::Low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("failed to claim gpio {pin}: {detail}")]
    Claim { pin: u8, detail: String },
    #[error("read failed on gpio {pin}: {detail}")]
    Read { pin: u8, detail: String },
    #[error("write failed on gpio {pin}: {detail}")]
    Write { pin: u8, detail: String },
}

pub trait DigitalInput: Send {
    fn read(&mut self) -> Result<Level, PinError>;
}

pub trait DigitalOutput: Send {
    fn write(&mut self, level: Level) -> Result<(), PinError>;
}

pub trait PwmOutput: Send {
    /// Drive the line at `frequency_hz` with the given duty cycle percent.
    fn set_duty(&mut self, frequency_hz: u32, percent: u8) -> Result<(), PinError>;
}

/// Claims pins at construction time. A claim failure is fatal: the process
/// must not start with a half-initialized controller.
pub trait Board {
    type Input: DigitalInput + 'static;
    type Output: DigitalOutput + 'static;
    type Pwm: PwmOutput + 'static;

    fn claim_input(&mut self, pin: u8, pull: Pull) -> Result<Self::Input, PinError>;
    fn claim_output(&mut self, pin: u8) -> Result<Self::Output, PinError>;
    fn claim_pwm(&mut self, pin: u8) -> Result<Self::Pwm, PinError>;
}

/// In-memory board for tests and headless development. Input levels are
/// shared handles so a test can flip a line while a tracker samples it.
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Clone, Default)]
    pub struct MockBoard {
        pub fail_claims: bool,
        levels: Arc<Mutex<HashMap<u8, SharedLevel>>>,
    }

    impl MockBoard {
        /// Handle to an input line's level, creating it if not yet claimed.
        /// Lets a test flip a line while the reactor polls it.
        pub fn level(&self, pin: u8) -> SharedLevel {
            self.levels
                .lock()
                .expect("levels lock")
                .entry(pin)
                // pull-up lines idle high
                .or_insert_with(|| SharedLevel::new(Level::High))
                .clone()
        }
    }

    #[derive(Clone)]
    pub struct SharedLevel(Arc<Mutex<Level>>);

    impl SharedLevel {
        pub fn new(level: Level) -> Self {
            Self(Arc::new(Mutex::new(level)))
        }

        pub fn set(&self, level: Level) {
            *self.0.lock().expect("level lock") = level;
        }

        pub fn get(&self) -> Level {
            *self.0.lock().expect("level lock")
        }
    }

    pub struct MockInput {
        pub level: SharedLevel,
    }

    impl DigitalInput for MockInput {
        fn read(&mut self) -> Result<Level, PinError> {
            Ok(self.level.get())
        }
    }

    #[derive(Default)]
    pub struct MockOutput {
        pub writes: Vec<Level>,
    }

    impl DigitalOutput for MockOutput {
        fn write(&mut self, level: Level) -> Result<(), PinError> {
            self.writes.push(level);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockPwm {
        pub duties: Vec<(u32, u8)>,
    }

    impl PwmOutput for MockPwm {
        fn set_duty(&mut self, frequency_hz: u32, percent: u8) -> Result<(), PinError> {
            self.duties.push((frequency_hz, percent));
            Ok(())
        }
    }

    impl Board for MockBoard {
        type Input = MockInput;
        type Output = MockOutput;
        type Pwm = MockPwm;

        fn claim_input(&mut self, pin: u8, _pull: Pull) -> Result<Self::Input, PinError> {
            if self.fail_claims {
                return Err(PinError::Claim {
                    pin,
                    detail: "mock claim failure".to_string(),
                });
            }
            Ok(MockInput {
                level: self.level(pin),
            })
        }

        fn claim_output(&mut self, pin: u8) -> Result<Self::Output, PinError> {
            if self.fail_claims {
                return Err(PinError::Claim {
                    pin,
                    detail: "mock claim failure".to_string(),
                });
            }
            Ok(MockOutput::default())
        }

        fn claim_pwm(&mut self, pin: u8) -> Result<Self::Pwm, PinError> {
            if self.fail_claims {
                return Err(PinError::Claim {
                    pin,
                    detail: "mock claim failure".to_string(),
                });
            }
            Ok(MockPwm::default())
        }
    }
}
