//! Process exit codes.

use crate::error::InputError;

pub mod codes {
    /// Every evaluated tier passed.
    pub const REPRODUCIBLE: u8 = 0;
    /// A verdict was reached and it is negative.
    pub const NOT_REPRODUCIBLE: u8 = 1;
    /// Anything else that stopped the run after input validation.
    pub const FAILURE: u8 = 1;
    /// Missing roots, bad profile, limits exceeded. No verdict was produced.
    pub const INVALID_INPUT: u8 = 2;
}

/// Maps an error that escaped a subcommand to its exit code.
pub fn code_for(err: &anyhow::Error) -> u8 {
    if err.chain().any(|c| c.is::<InputError>()) {
        codes::INVALID_INPUT
    } else {
        codes::FAILURE
    }
}
