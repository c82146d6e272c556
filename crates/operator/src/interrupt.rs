//! Ctrl-C handling: the first interrupt asks the run to stop after the
//! current step, the second stops it hard.

use std::sync::Arc;

use sectioning::{AbortController, StopLevel};

/// Tracks how many interrupts have been received.
#[derive(Debug, Default)]
pub struct InterruptEscalation {
    presses: u32,
}

impl InterruptEscalation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one interrupt and returns the stop level it maps to.
    pub fn press(&mut self) -> StopLevel {
        self.presses = self.presses.saturating_add(1);
        if self.presses == 1 {
            StopLevel::AfterStep
        } else {
            StopLevel::Hard
        }
    }
}

/// Waits for Ctrl-C and escalates on `abort` until a hard stop is issued.
pub async fn watch_interrupts(abort: Arc<AbortController>) -> std::io::Result<()> {
    let mut escalation = InterruptEscalation::new();
    loop {
        tokio::signal::ctrl_c().await?;
        let level = escalation.press();
        tracing::warn!(?level, "Interrupt received");
        abort.request(level);
        if level == StopLevel::Hard {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_press_escalates_to_hard() {
        let mut esc = InterruptEscalation::new();
        assert_eq!(esc.press(), StopLevel::AfterStep);
        assert_eq!(esc.press(), StopLevel::Hard);
        assert_eq!(esc.press(), StopLevel::Hard);
    }
}
