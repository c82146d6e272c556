//! Parsing of operator stop commands.

use std::str::FromStr;

use sectioning::StopLevel;
use thiserror::Error;

/// A console line that is not a recognised command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown operator command '{input}' (expected one of: step, after-step, slice, after-slice, hard, stop)")]
pub struct CommandError {
    pub input: String,
}

/// A stop request typed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCommand(pub StopLevel);

impl FromStr for StopCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "step" | "after-step" | "after_step" => StopLevel::AfterStep,
            "slice" | "after-slice" | "after_slice" => StopLevel::AfterSlice,
            "hard" | "stop" => StopLevel::Hard,
            _ => {
                return Err(CommandError {
                    input: s.trim().to_string(),
                })
            }
        };
        Ok(StopCommand(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_aliases_case_insensitively() {
        let parse = |s: &str| s.parse::<StopCommand>().map(|c| c.0);
        assert_eq!(parse("step"), Ok(StopLevel::AfterStep));
        assert_eq!(parse("  After-Step \n"), Ok(StopLevel::AfterStep));
        assert_eq!(parse("SLICE"), Ok(StopLevel::AfterSlice));
        assert_eq!(parse("after_slice"), Ok(StopLevel::AfterSlice));
        assert_eq!(parse("stop"), Ok(StopLevel::Hard));
        assert_eq!(parse("hard"), Ok(StopLevel::Hard));
    }

    #[test]
    fn rejects_anything_else() {
        let err = "pause".parse::<StopCommand>().unwrap_err();
        assert_eq!(err.input, "pause");
    }
}
