//! Process exit codes.
//!
//! 0 means the run completed with nothing left to change, 1 means the run
//! completed but found text to fix or proposals that failed, 2 means the tool
//! itself could not do its job (bad invocation, unreadable input, broken
//! config).

pub const SUCCESS: i32 = 0;
pub const ISSUES_FOUND: i32 = 1;
pub const TOOL_ERROR: i32 = 2;

pub mod exit {
    /// The run worked and something needed (or still needs) fixing.
    pub fn issues_found() -> ! {
        std::process::exit(super::ISSUES_FOUND)
    }

    /// The tool could not complete the run.
    pub fn tool_error() -> ! {
        std::process::exit(super::TOOL_ERROR)
    }
}
