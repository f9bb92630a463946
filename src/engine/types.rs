use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::warn;

/// Cooperative cancellation token shared between a command and its fan-out.
///
/// Checked between services only; operations already handed to the engine
/// run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Cancel on the first Ctrl+C. A second one exits right away.
    ///
    /// Only one handler can be installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                std::process::exit(130);
            }
            warn!("interrupted, waiting for running operations to finish");
            token.cancel();
        })
    }
}

/// A container as reported by the engine's `ps`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Parse the `k=v,k2=v2` label column emitted by `ps --format '{{json .}}'`.
///
/// Values may themselves contain `=`; only the first one splits.
pub fn parse_label_list(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test in this binary that installs the process-wide handler.
    #[cfg(unix)]
    #[test]
    fn interrupt_cancels_the_token() {
        use std::time::{Duration, Instant};

        let token = CancelToken::new();
        token.cancel_on_interrupt().unwrap();
        // SAFETY: raise only delivers a signal to this process; the handler is installed.
        unsafe { libc::raise(libc::SIGINT) };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !token.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_token_is_visible_across_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn label_list_splits_on_first_equals() {
        let labels = parse_label_list("com.docker.compose.project=demo,url=http://x?a=b,");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["com.docker.compose.project"], "demo");
        assert_eq!(labels["url"], "http://x?a=b");
    }

    #[test]
    fn label_list_ignores_garbage() {
        assert!(parse_label_list("").is_empty());
        assert!(parse_label_list("novalue").is_empty());
    }
}
