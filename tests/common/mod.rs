// tests/common/mod.rs

//! Shared test utilities: a real lockmgrd serving on a temporary socket.

#![allow(dead_code)]

use lockmgr::daemon::{run_daemon, DaemonConfig};
use lockmgr::{Endpoint, LockClient};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// A daemon running on its own runtime thread.
///
/// Dropping it stops the daemon. Keep it alive for the whole test.
pub struct TestDaemon {
    temp_dir: TempDir,
    socket_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestDaemon {
    /// Start a daemon managing `file_count` files in a fresh temp dir.
    pub fn start(file_count: u32) -> Self {
        Self::start_with(|config| config.with_file_count(file_count))
    }

    /// Start a daemon after adjusting its config.
    pub fn start_with(adjust: impl FnOnce(DaemonConfig) -> DaemonConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("run/lockmgrd.sock");
        let config = adjust(
            DaemonConfig::default()
                .with_socket_path(&socket_path)
                .with_data_dir(temp_dir.path().join("data")),
        );

        let (tx, rx) = oneshot::channel::<()>();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime
                .block_on(run_daemon(config, async {
                    let _ = rx.await;
                }))
                .unwrap();
            runtime.shutdown_timeout(Duration::from_millis(100));
        });

        let daemon = Self {
            temp_dir,
            socket_path,
            shutdown: Some(tx),
            thread: Some(thread),
        };
        daemon.wait_ready();
        daemon
    }

    fn wait_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let client = self.client();
        while client.health().is_err() {
            assert!(Instant::now() < deadline, "daemon did not come up");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// A client connected over the Unix socket.
    pub fn client(&self) -> LockClient {
        LockClient::new(Endpoint::Unix(self.socket_path.clone()))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    /// Contents of a managed file.
    pub fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.data_dir().join(name)).unwrap()
    }

    /// Stop the daemon and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Poll until `cond` holds or panic after a few seconds.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}
