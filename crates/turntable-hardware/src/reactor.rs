use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::debounce::{
    EncoderEvent, EncoderTracker, StallDetector, SwitchTracker, STALL_TIMEOUT_MS,
};
use crate::events::{InputEvent, MotorCommand};
use crate::motor::{MotorDirection, MotorDriver};
use crate::pins::{gpio, Board, DigitalInput, Level, PinError, Pull};

const HINGE_POLL: Duration = Duration::from_millis(200);
const BUTTON_POLL: Duration = Duration::from_millis(10);
const ENCODER_POLL: Duration = Duration::from_millis(10);
const STALL_POLL: Duration = Duration::from_millis(100);

/// Owns every claimed pin and the motor driver. Splits into one polling
/// task per control once started; all tasks emit onto the shared event
/// channel and the motor task alone touches the driver.
pub struct InputReactor<B: Board> {
    hinge: B::Input,
    button: B::Input,
    enc_clock: B::Input,
    enc_data: B::Input,
    enc_switch: B::Input,
    motor_encoder: B::Input,
    motor: MotorDriver<B::Output, B::Pwm>,
    events: mpsc::Sender<InputEvent>,
    motor_commands: mpsc::UnboundedReceiver<MotorCommand>,
}

impl<B: Board> InputReactor<B> {
    /// Claims all pins up front. Any failure here must abort startup.
    pub fn new(
        board: &mut B,
        events: mpsc::Sender<InputEvent>,
        motor_commands: mpsc::UnboundedReceiver<MotorCommand>,
    ) -> Result<Self, PinError> {
        let motor = MotorDriver::new(
            board.claim_output(gpio::MOTOR_FWD)?,
            board.claim_output(gpio::MOTOR_REV)?,
            board.claim_pwm(gpio::MOTOR_PWM)?,
        );
        Ok(Self {
            hinge: board.claim_input(gpio::HINGE, Pull::Up)?,
            button: board.claim_input(gpio::BUTTON, Pull::Up)?,
            enc_clock: board.claim_input(gpio::ENC_CLK, Pull::None)?,
            enc_data: board.claim_input(gpio::ENC_DT, Pull::None)?,
            enc_switch: board.claim_input(gpio::ENC_SW, Pull::Up)?,
            motor_encoder: board.claim_input(gpio::MOTOR_ENC_A, Pull::None)?,
            motor,
            events,
            motor_commands,
        })
    }

    /// Spawns the polling loops. Each runs until the event channel closes.
    pub fn start(self) {
        info!(event = "reactor_start");
        let Self {
            hinge,
            button,
            enc_clock,
            enc_data,
            enc_switch,
            motor_encoder,
            motor,
            events,
            motor_commands,
        } = self;

        tokio::spawn(poll_switch(
            hinge,
            HINGE_POLL,
            events.clone(),
            InputEvent::HingeClosed,
            InputEvent::HingeOpen,
        ));
        tokio::spawn(poll_switch(
            button,
            BUTTON_POLL,
            events.clone(),
            InputEvent::ButtonDown,
            InputEvent::ButtonUp,
        ));
        tokio::spawn(poll_encoder(enc_clock, enc_data, enc_switch, events.clone()));
        tokio::spawn(run_motor(motor, motor_encoder, motor_commands, events));
    }
}

fn read_or_warn(input: &mut impl DigitalInput) -> Option<Level> {
    match input.read() {
        Ok(level) => Some(level),
        Err(err) => {
            // runtime read faults are transient; keep polling
            warn!(event = "gpio_read_error", error = %err);
            None
        }
    }
}

async fn poll_switch(
    mut input: impl DigitalInput,
    interval: Duration,
    events: mpsc::Sender<InputEvent>,
    on_closed: InputEvent,
    on_open: InputEvent,
) {
    let initially_closed = input
        .read()
        .map(|level| level.is_active_low())
        .unwrap_or(false);
    let mut tracker = SwitchTracker::new(initially_closed);

    loop {
        tokio::time::sleep(interval).await;
        let Some(level) = read_or_warn(&mut input) else {
            continue;
        };
        if let Some(transition) = tracker.on_sample(level.is_active_low()) {
            let event = match transition {
                crate::debounce::SwitchTransition::Closed => on_closed,
                crate::debounce::SwitchTransition::Open => on_open,
            };
            if events.send(event).await.is_err() {
                debug!(event = "event_channel_closed");
                return;
            }
        }
    }
}

async fn poll_encoder(
    mut clock: impl DigitalInput,
    mut data: impl DigitalInput,
    mut switch: impl DigitalInput,
    events: mpsc::Sender<InputEvent>,
) {
    let epoch = Instant::now();
    let initial_clock = clock.read().unwrap_or(Level::Low);
    let initially_down = switch
        .read()
        .map(|level| level.is_active_low())
        .unwrap_or(false);
    let mut tracker = EncoderTracker::new(initial_clock, initially_down);

    loop {
        tokio::time::sleep(ENCODER_POLL).await;
        let (Some(clk), Some(dt), Some(sw)) = (
            read_or_warn(&mut clock),
            read_or_warn(&mut data),
            read_or_warn(&mut switch),
        ) else {
            continue;
        };
        let now_ms = epoch.elapsed().as_millis() as u64;
        for encoder_event in tracker.on_sample(clk, dt, sw.is_active_low(), now_ms) {
            let event = match encoder_event {
                EncoderEvent::FreeRotate(direction) => InputEvent::FreeRotate(direction),
                EncoderEvent::DownRotate(direction) => InputEvent::DownRotate(direction),
                EncoderEvent::ShortPress => InputEvent::ShortPress,
            };
            if events.send(event).await.is_err() {
                debug!(event = "event_channel_closed");
                return;
            }
        }
    }
}

/// Sole owner of the motor driver. Applies commands from the store and the
/// dispatcher, and watches the motor encoder for stalls while driven.
async fn run_motor<O, P>(
    mut motor: MotorDriver<O, P>,
    mut encoder: impl DigitalInput,
    mut commands: mpsc::UnboundedReceiver<MotorCommand>,
    events: mpsc::Sender<InputEvent>,
) where
    O: crate::pins::DigitalOutput,
    P: crate::pins::PwmOutput,
{
    let epoch = Instant::now();
    let mut stall = StallDetector::new(STALL_TIMEOUT_MS);
    let mut ticker = tokio::time::interval(STALL_POLL);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!(event = "motor_channel_closed");
                    return;
                };
                let now_ms = epoch.elapsed().as_millis() as u64;
                match command {
                    MotorCommand::SetDirection(direction) => {
                        if let Err(err) = motor.set_direction(direction) {
                            warn!(event = "motor_write_error", error = %err);
                        }
                        match direction {
                            MotorDirection::Stop => stall.disarm(),
                            _ => arm_stall(&mut stall, &mut encoder, now_ms),
                        }
                    }
                    MotorCommand::SetSpeed(percent) => {
                        if let Err(err) = motor.set_speed(percent) {
                            warn!(event = "motor_write_error", error = %err);
                        }
                        if percent > 0 {
                            arm_stall(&mut stall, &mut encoder, now_ms);
                        } else {
                            stall.disarm();
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                if !stall.is_armed() {
                    continue;
                }
                let Some(level) = read_or_warn(&mut encoder) else {
                    continue;
                };
                let now_ms = epoch.elapsed().as_millis() as u64;
                if stall.on_sample(level, now_ms) {
                    warn!(event = "motor_stall");
                    if events.send(InputEvent::MotorStall).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn arm_stall(stall: &mut StallDetector, encoder: &mut impl DigitalInput, now_ms: u64) {
    let level = encoder.read().unwrap_or(Level::Low);
    stall.arm(level, now_ms);
}
