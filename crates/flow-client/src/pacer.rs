//! Sliding-window request pacing for the quota-limited vendor API.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Allows at most `max_in_window` acquisitions per `window`, sleeping the
/// caller until a slot frees up.
#[derive(Clone)]
pub(crate) struct RequestPacer {
    stamps: Arc<Mutex<VecDeque<Instant>>>,
    max_in_window: usize,
    window: Duration,
}

impl RequestPacer {
    pub(crate) fn new(max_in_window: usize, window: Duration) -> Self {
        Self {
            stamps: Arc::new(Mutex::new(VecDeque::new())),
            max_in_window,
            window,
        }
    }

    pub(crate) async fn acquire(&self) {
        loop {
            let sleep_for = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    stamps.pop_front();
                }

                if stamps.len() < self.max_in_window {
                    stamps.push_back(now);
                    return;
                }

                // Oldest in-window request decides how long until a slot opens.
                let oldest = *stamps.front().unwrap();
                (oldest + self.window).duration_since(now) + Duration::from_millis(25)
            };

            tracing::debug!(
                "flow api pacer: waiting {:.1}s for a request slot",
                sleep_for.as_secs_f64()
            );
            tokio::time::sleep(sleep_for).await;
        }
    }
}
