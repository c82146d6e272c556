//! Operator-facing sources of stop requests.
//!
//! The scheduler never reads input itself. This crate turns console commands
//! and interrupts into [`sectioning::AbortController`] requests, which the
//! scheduler observes at its next step or slice boundary.
//!
//! | Command | Request |
//! |---------|---------|
//! | `step`, `after-step` | stop after the step in progress |
//! | `slice`, `after-slice` | stop after the slice in progress |
//! | `hard`, `stop` | issue no further commands |
//! | Ctrl-C (first / second) | after-step / hard |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Terminal I/O and signal handling live here.

pub mod command;
pub mod console;
pub mod interrupt;

pub use command::{CommandError, StopCommand};
pub use console::forward_commands;
pub use interrupt::{watch_interrupts, InterruptEscalation};
