use std::sync::{Arc, Mutex};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, info};
use turntable_core::protocol::{snapshot_frames, Frame};
use turntable_core::state::{AppState, StateChange};
use turntable_hardware::{MotorCommand, MotorDirection};

use crate::broker::{ClientHandle, ConnectionBroker};

/// A motor nudge that is acted on but never stored as state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transient {
    FastForward,
    Rewind,
}

/// The single writer for the canonical application state. Every mutation
/// funnels through `apply`, which triggers hardware reactions and fans the
/// change out to every connected client.
pub struct StateStore {
    state: Mutex<AppState>,
    provider_name: String,
    broker: Arc<ConnectionBroker>,
    motor: Option<mpsc::UnboundedSender<MotorCommand>>,
}

impl StateStore {
    pub fn new(
        provider_name: String,
        broker: Arc<ConnectionBroker>,
        motor: Option<mpsc::UnboundedSender<MotorCommand>>,
    ) -> Self {
        Self {
            state: Mutex::new(AppState::default()),
            provider_name,
            broker,
            motor,
        }
    }

    /// Apply one state change. An update that would not change the stored
    /// value is a no-op: no hardware reaction, no broadcast. Broadcasting
    /// happens under the state lock so per-key updates go out in the order
    /// they were applied.
    pub fn apply(&self, change: StateChange) {
        let state = self.state.lock().expect("state lock");
        if change.is_noop_for(&state) {
            debug!(event = "state_noop", key = change.key().as_str());
            return;
        }
        let mut state = state;
        change.apply_to(&mut state);
        info!(event = "state_update", key = change.key().as_str());

        match &change {
            StateChange::PlayState(playing) => {
                self.motor_command(MotorCommand::SetDirection(if *playing {
                    MotorDirection::Forward
                } else {
                    MotorDirection::Stop
                }));
            }
            StateChange::Settings(settings) => {
                self.motor_command(MotorCommand::SetSpeed(if settings.enable_motor {
                    100
                } else {
                    0
                }));
            }
            StateChange::CurrentTrack(_) => {}
        }

        self.broker
            .broadcast(&Frame::state_broadcast(&change, &self.provider_name));
    }

    /// Drive the motor without persisting anything: fast-forward and
    /// rewind are momentary, the stored play state is untouched.
    pub fn apply_transient(&self, transient: Transient) {
        let direction = match transient {
            Transient::FastForward => MotorDirection::Forward,
            Transient::Rewind => MotorDirection::Reverse,
        };
        debug!(event = "motor_transient", direction = ?direction);
        self.motor_command(MotorCommand::SetDirection(direction));
    }

    /// Restore the fixed defaults and stop the motor. Performs no
    /// broadcast; callers announce the reset themselves when needed.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("state lock");
        *state = AppState::default();
        info!(event = "state_reset");
        self.motor_command(MotorCommand::SetSpeed(0));
        self.motor_command(MotorCommand::SetDirection(MotorDirection::Stop));
    }

    /// Register the host socket and push it the current snapshot. The
    /// state lock is held across registration, so no `apply` can slip a
    /// broadcast between the snapshot and the socket's insertion. Lock
    /// order is state then sockets, the same as `apply`'s broadcast.
    pub fn register_host(
        &self,
        session_id: &str,
        sender: mpsc::Sender<Message>,
    ) -> Arc<ClientHandle> {
        let state = self.state.lock().expect("state lock");
        self.broker
            .register_host(session_id, sender, snapshot_frames(&state))
    }

    pub fn register_side(
        &self,
        session_id: &str,
        sender: mpsc::Sender<Message>,
    ) -> Arc<ClientHandle> {
        let state = self.state.lock().expect("state lock");
        self.broker
            .register_side(session_id, sender, snapshot_frames(&state))
    }

    pub fn snapshot(&self) -> AppState {
        self.state.lock().expect("state lock").clone()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn motor_command(&self, command: MotorCommand) {
        if let Some(motor) = &self.motor {
            if motor.send(command).is_err() {
                debug!(event = "motor_channel_closed");
            }
        }
    }
}
