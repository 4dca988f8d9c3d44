//! Execution modes.

use crate::client::Client;
use crate::config::ExecutionMode;
use crate::error::ClientResult;
use tracing::info;

impl Client {
    /// Starts the client.
    ///
    /// In [`ExecutionMode::EventLoop`] this builds a single-threaded tokio
    /// runtime and blocks until a fatal error. In [`ExecutionMode::Polled`]
    /// it schedules the connection, runs one pass and returns; the host
    /// then calls [`Client::update`] in its own loop.
    pub fn start(&mut self) -> ClientResult<()> {
        match self.config.mode {
            ExecutionMode::EventLoop => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(self.run())
            }
            ExecutionMode::Polled => {
                self.begin();
                self.update().map(|_| ())
            }
        }
    }

    /// Runs the client on the current tokio runtime until a fatal error.
    ///
    /// Passes only yield between tasks, so hooks never interleave.
    pub async fn run(&mut self) -> ClientResult<()> {
        self.begin();
        loop {
            let wait = self.update()?;
            tokio::time::sleep(wait).await;
        }
    }

    fn begin(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(device_id = %self.config.device_id, mode = ?self.config.mode, "starting client");
        self.schedule_reconnect();
    }
}
