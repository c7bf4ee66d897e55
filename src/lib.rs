pub mod config;
pub mod control;
pub mod coordinator;
pub mod host;
pub mod modal;
pub mod placement;
pub mod runtime;
pub mod server;
pub mod settings;
pub mod style;
pub mod utils;
pub mod watcher;

pub use config::{
    ButtonShape, ConfigSource, EmbedMode, FetchError, HttpConfigFetcher, RemoteConfig,
    WidgetConfig,
};
pub use coordinator::{
    AttemptOutcome, InjectionCoordinator, InjectionPhase, InjectionSnapshot, Trigger,
};
pub use host::{HostPage, MemoryPage};
pub use modal::{Activation, CloseReason, ModalController, ModalSession};
pub use runtime::WidgetRuntime;
pub use settings::{FetchFailurePolicy, WidgetSettings};

/// Initializes logging (reads RUST_LOG, defaults to info).
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
