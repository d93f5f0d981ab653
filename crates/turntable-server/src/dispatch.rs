use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turntable_core::protocol::{Command, Frame};
use turntable_core::state::StateChange;
use turntable_hardware::{
    Board, InputEvent, InputReactor, MotorCommand, MotorDirection, PinError,
};

use crate::flows;
use crate::AppContext;

/// Volume change per encoder detent.
const VOLUME_STEP: i32 = 5;

const EVENT_QUEUE_DEPTH: usize = 64;

/// Wire a physical board into the running server: claim the pins, start
/// the polling loops, and spawn the dispatcher that consumes their
/// events. `motor_commands` is the receiving end of the channel whose
/// sender the context carries.
pub fn attach_board<B: Board>(
    board: &mut B,
    ctx: Arc<AppContext>,
    motor_commands: mpsc::UnboundedReceiver<MotorCommand>,
) -> Result<(), PinError> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let reactor = InputReactor::new(board, events_tx, motor_commands)?;
    reactor.start();
    tokio::spawn(run_dispatcher(ctx, events_rx));
    Ok(())
}

/// Consume debounced hardware events and translate each into the same
/// state mutations and host commands the websocket path produces.
pub async fn run_dispatcher(ctx: Arc<AppContext>, mut events: mpsc::Receiver<InputEvent>) {
    info!(event = "dispatcher_started");
    while let Some(event) = events.recv().await {
        handle_event(&ctx, event).await;
    }
    info!(event = "dispatcher_stopped");
}

async fn handle_event(ctx: &Arc<AppContext>, event: InputEvent) {
    debug!(event = "input_event", input = ?event);
    match event {
        InputEvent::HingeOpen => ctx.store.apply(StateChange::PlayState(true)),
        InputEvent::HingeClosed => ctx.store.apply(StateChange::PlayState(false)),
        InputEvent::ButtonDown => {
            // scanning talks to the camera, classifier, and provider; run
            // it off the event loop so further input stays responsive
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(err) = flows::scan_and_play(&ctx).await {
                    warn!(event = "scan_failed", error = %err);
                }
            });
        }
        InputEvent::ButtonUp => {}
        InputEvent::FreeRotate(detents) => {
            let settings = ctx.store.snapshot().settings;
            let volume = i32::from(settings.volume) + i32::from(detents) * VOLUME_STEP;
            ctx.store
                .apply(StateChange::Settings(settings.with_volume(volume)));
        }
        InputEvent::DownRotate(detents) => {
            let command = if detents > 0 {
                Command::PlayNext
            } else {
                Command::PlayPrevious
            };
            ctx.broker.send_to_host(&Frame::bare(command));
        }
        InputEvent::ShortPress => {
            let playing = ctx.store.snapshot().play_state;
            ctx.store.apply(StateChange::PlayState(!playing));
        }
        InputEvent::MotorStall => {
            warn!(event = "motor_stalled");
            if let Some(motor) = &ctx.motor {
                let _ = motor.send(MotorCommand::SetDirection(MotorDirection::Stop));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use axum::extract::ws::Message;

    use crate::broker::ConnectionBroker;
    use crate::collab::NullProvider;
    use crate::session::SessionRegistry;
    use crate::store::StateStore;

    struct Rig {
        ctx: Arc<AppContext>,
        host_rx: mpsc::Receiver<Message>,
        motor_rx: mpsc::UnboundedReceiver<MotorCommand>,
    }

    fn rig() -> Rig {
        let broker = Arc::new(ConnectionBroker::new());
        let (host_tx, host_rx) = mpsc::channel(64);
        broker.register_host("host", host_tx, Vec::new());
        let (motor_tx, motor_rx) = mpsc::unbounded_channel();
        let store = StateStore::new("none".into(), broker.clone(), Some(motor_tx.clone()));
        Rig {
            ctx: Arc::new(AppContext {
                registry: SessionRegistry::new(),
                store,
                broker,
                provider: Arc::new(NullProvider),
                classifier: None,
                camera: None,
                motor: Some(motor_tx),
                capture_dir: PathBuf::from("/tmp/captures"),
            }),
            host_rx,
            motor_rx,
        }
    }

    fn recv_frame(rx: &mut mpsc::Receiver<Message>) -> Frame {
        match rx.try_recv().expect("queued message") {
            Message::Text(text) => serde_json::from_str(&text).expect("frame json"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hinge_controls_play_state() {
        let rig = rig();
        handle_event(&rig.ctx, InputEvent::HingeOpen).await;
        assert!(rig.ctx.store.snapshot().play_state);
        handle_event(&rig.ctx, InputEvent::HingeClosed).await;
        assert!(!rig.ctx.store.snapshot().play_state);
    }

    #[tokio::test]
    async fn short_press_toggles_play_state() {
        let rig = rig();
        handle_event(&rig.ctx, InputEvent::ShortPress).await;
        assert!(rig.ctx.store.snapshot().play_state);
        handle_event(&rig.ctx, InputEvent::ShortPress).await;
        assert!(!rig.ctx.store.snapshot().play_state);
    }

    #[tokio::test]
    async fn free_rotation_steps_volume_with_clamping() {
        let rig = rig();
        handle_event(&rig.ctx, InputEvent::FreeRotate(1)).await;
        assert_eq!(rig.ctx.store.snapshot().settings.volume, 55);
        handle_event(&rig.ctx, InputEvent::FreeRotate(-1)).await;
        assert_eq!(rig.ctx.store.snapshot().settings.volume, 50);

        for _ in 0..15 {
            handle_event(&rig.ctx, InputEvent::FreeRotate(1)).await;
        }
        assert_eq!(rig.ctx.store.snapshot().settings.volume, 100);
    }

    #[tokio::test]
    async fn down_rotation_skips_tracks_via_the_host() {
        let mut rig = rig();
        handle_event(&rig.ctx, InputEvent::DownRotate(1)).await;
        handle_event(&rig.ctx, InputEvent::DownRotate(-1)).await;

        assert_eq!(recv_frame(&mut rig.host_rx).command, Command::PlayNext);
        assert_eq!(recv_frame(&mut rig.host_rx).command, Command::PlayPrevious);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_board_drives_play_state_through_the_hinge() {
        use std::time::Duration;
        use turntable_hardware::pins::{gpio, mock::MockBoard, Level};

        let broker = Arc::new(ConnectionBroker::new());
        let (motor_tx, motor_rx) = mpsc::unbounded_channel();
        let store = StateStore::new("none".into(), broker.clone(), Some(motor_tx.clone()));
        let ctx = Arc::new(AppContext {
            registry: SessionRegistry::new(),
            store,
            broker,
            provider: Arc::new(NullProvider),
            classifier: None,
            camera: None,
            motor: Some(motor_tx),
            capture_dir: PathBuf::from("/tmp/captures"),
        });

        let mut board = MockBoard::default();
        attach_board(&mut board, ctx.clone(), motor_rx).expect("attach");
        tokio::task::yield_now().await;

        // close then reopen the lid; the open edge starts playback
        board.level(gpio::HINGE).set(Level::Low);
        tokio::time::sleep(Duration::from_millis(500)).await;
        board.level(gpio::HINGE).set(Level::High);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(ctx.store.snapshot().play_state);
    }

    #[tokio::test]
    async fn stall_stops_the_motor_without_touching_state() {
        let mut rig = rig();
        handle_event(&rig.ctx, InputEvent::HingeOpen).await;
        while rig.motor_rx.try_recv().is_ok() {}

        handle_event(&rig.ctx, InputEvent::MotorStall).await;
        assert_eq!(
            rig.motor_rx.try_recv(),
            Ok(MotorCommand::SetDirection(MotorDirection::Stop))
        );
        // stored play state is unchanged; the stall is a hardware matter
        assert!(rig.ctx.store.snapshot().play_state);
    }
}
