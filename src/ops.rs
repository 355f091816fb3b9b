//! Ops and extension definition for the page sandbox.
//!
//! The extension gives pages a `console` whose output is captured into the
//! runtime's `OpState`, and the `module`/`exports` shim node-targeted
//! bundles assign their result to. Nothing else is exposed: no fs, net or
//! env ops are registered.

use deno_core::{op2, OpState};

// ============================================================================
// Console Output Capture
// ============================================================================

/// Captured console output from a page evaluation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.warns.is_empty() && self.errors.is_empty()
    }

    pub fn record(&mut self, level: ConsoleLevel, line: String) {
        match level {
            ConsoleLevel::Log => self.logs.push(line),
            ConsoleLevel::Warn => self.warns.push(line),
            ConsoleLevel::Error => self.errors.push(line),
        }
    }
}

/// Severity passed from the bootstrap's `console` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// `0` log/info/debug, `1` warn, `2` error. Unknown codes log.
    fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Warn,
            2 => Self::Error,
            _ => Self::Log,
        }
    }
}

#[op2(fast)]
pub fn op_page_console(state: &mut OpState, #[smi] level: u32, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.record(ConsoleLevel::from_code(level), msg.to_owned());
    }
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    page_runtime,
    ops = [op_page_console],
    esm_entry_point = "ext:page_runtime/bootstrap.js",
    esm = ["ext:page_runtime/bootstrap.js" = "src/bootstrap.js"],
);
