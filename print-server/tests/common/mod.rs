//! Shared test fixtures: an in-memory transport and synthetic images

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use parking_lot::Mutex;
use print_server::queue::WorkerConfig;
use receipt_printer::{PrintError, PrintResult, PrinterInfo, PrinterTransport, encode_png};

type SendHook = Box<dyn Fn(usize) + Send + Sync>;

/// Records every send; can be told to fail or stall
#[derive(Default)]
pub struct MockTransport {
    printers: Vec<String>,
    sends: Mutex<Vec<(String, Vec<u8>)>>,
    attempts: AtomicUsize,
    /// Fail this many sends before succeeding
    fail_first: AtomicUsize,
    /// Fail every send
    always_fail: bool,
    delay: Option<Duration>,
    /// Runs at the start of each send with the 1-based attempt number
    hook: Option<SendHook>,
}

impl MockTransport {
    pub fn new(printers: &[&str]) -> Self {
        Self {
            printers: printers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing(printers: &[&str]) -> Self {
        Self {
            always_fail: true,
            ..Self::new(printers)
        }
    }

    pub fn fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_send_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn sends(&self) -> Vec<(String, Vec<u8>)> {
        self.sends.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrinterTransport for MockTransport {
    async fn send_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.hook {
            hook(attempt);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(PrintError::Offline(printer.to_string()));
        }
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(PrintError::Connection(format!("{} unreachable", printer)));
        }
        self.sends.lock().push((printer.to_string(), data.to_vec()));
        Ok(())
    }

    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        Ok(self
            .printers
            .iter()
            .enumerate()
            .map(|(i, name)| PrinterInfo {
                name: name.clone(),
                is_default: i == 0,
            })
            .collect())
    }
}

/// PNG of a solid grey image
pub fn png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    encode_png(&DynamicImage::ImageLuma8(img)).unwrap()
}

/// Worker settings with short timings for tests
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        ..WorkerConfig::default()
    }
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
