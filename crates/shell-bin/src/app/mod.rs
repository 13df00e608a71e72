//! Application wiring: startup, deep-link routing, and window state.

mod deep_links;
mod health_gate;
mod init;
pub(crate) mod state;
mod window;

pub use deep_links::{route_launch, route_url};
pub use health_gate::{wait_for_backend, HEALTH_MAX_ATTEMPTS, HEALTH_POLL_INTERVAL};
pub use init::run_shell;
pub use state::ShellState;
pub use window::{WindowHandle, WindowReceiver};
