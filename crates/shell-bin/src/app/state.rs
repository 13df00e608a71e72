//! Shell state definition.

use crate::app::{WindowHandle, WindowReceiver};
use deep_link::PendingBuffer;
use identity_client::AdminClient;
use shell_config_and_utils::{Config, Paths};
use shell_storage::SecureVault;
use std::sync::Arc;

/// Opens a URL in the system browser.
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Shared shell state (thread-safe).
#[derive(Clone)]
pub struct ShellState {
    pub config: Arc<Config>,
    #[allow(dead_code)]
    pub paths: Arc<Paths>,
    /// Encrypted key/value store behind `secure-store.*`.
    pub vault: Arc<SecureVault>,
    /// Present only when the service key was supplied at startup.
    pub admin: Option<Arc<AdminClient>>,
    /// Deep links received before the window subscribed.
    pub deep_links: Arc<PendingBuffer<WindowReceiver>>,
    pub window: WindowHandle,
    pub browser: BrowserLauncher,
}

impl ShellState {
    pub fn new(
        config: Config,
        paths: Paths,
        vault: SecureVault,
        admin: Option<AdminClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            paths: Arc::new(paths),
            vault: Arc::new(vault),
            admin: admin.map(Arc::new),
            deep_links: Arc::new(PendingBuffer::new()),
            window: WindowHandle::default(),
            browser: Arc::new(|url: &str| open::that(url)),
        }
    }

    /// Replace the browser launcher.
    #[cfg(test)]
    pub fn with_browser(mut self, browser: BrowserLauncher) -> Self {
        self.browser = browser;
        self
    }
}
