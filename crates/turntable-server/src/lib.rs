pub mod broker;
pub mod collab;
pub mod dispatch;
pub mod flows;
pub mod policy;
pub mod session;
pub mod store;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use turntable_hardware::MotorCommand;

use broker::ConnectionBroker;
use collab::{Camera, Classifier, MusicProvider};
use session::SessionRegistry;
use store::StateStore;

/// Everything the connection handlers, policy executor, and hardware
/// dispatcher share. Built once at startup and passed by handle; no
/// module-level globals.
pub struct AppContext {
    pub registry: SessionRegistry,
    pub store: StateStore,
    pub broker: Arc<ConnectionBroker>,
    pub provider: Arc<dyn MusicProvider>,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub camera: Option<Arc<dyn Camera>>,
    pub motor: Option<mpsc::UnboundedSender<MotorCommand>>,
    pub capture_dir: PathBuf,
}
