//! Periodic selector task

use tokio::sync::watch;
use tracing::{debug, info};

use source_select::ActiveFrameSelector;

/// Timer-driven task running the selection automaton.
///
/// The tick interval follows the automaton's current mode (fast while
/// DAY_ACTIVE, slow while NIGHT_ACTIVE, coarse while probing). A watch
/// channel delivers the clean-shutdown signal; the last-published active
/// frame and generation stay intact for straggling readers.
pub struct SelectorService {
    selector: ActiveFrameSelector,
    shutdown: watch::Receiver<bool>,
}

impl SelectorService {
    pub fn new(selector: ActiveFrameSelector, shutdown: watch::Receiver<bool>) -> Self {
        Self { selector, shutdown }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(mut self) {
        info!("selector task started");

        loop {
            let interval = self.selector.sample_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let now = tokio::time::Instant::now().into_std();
                    if let Some(transition) = self.selector.tick(now) {
                        debug!(?transition, "selector transition");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("selector task stopped");
    }
}
