//! Line-oriented command source (stdin in the binary, any reader in tests).

use sectioning::AbortController;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::command::StopCommand;

/// Reads commands from `reader` until end of input and forwards each stop
/// request to `abort`.
///
/// Blank lines are ignored; unknown commands are logged and skipped. Returns
/// the number of requests issued.
pub async fn forward_commands<R>(reader: R, abort: &AbortController) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut issued = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<StopCommand>() {
            Ok(StopCommand(level)) => {
                abort.request(level);
                issued += 1;
            }
            Err(err) => tracing::warn!(error = %err, "Ignoring operator input"),
        }
    }
    Ok(issued)
}
