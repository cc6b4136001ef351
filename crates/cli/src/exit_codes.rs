//! CLI Exit Code Registry
//!
//! Single source of truth for `perfrecon` exit codes. Scripts and schedulers
//! branch on these, so they are part of the shell contract.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success, reconciliation PASS                         |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad args, no input, unknown vendor)     |
//! | 3    | Reconciliation ran and the batch status is FAIL      |
//! | 4    | Config failed to parse or validate                   |
//! | 5    | Input or runtime error (unreadable file, bad CSV)    |
//! | 6    | Input parsed but contained no records                |

/// Success - reconciliation completed and passed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Failed checks or ERROR findings. Output was still written.
pub const EXIT_RECON_FAIL: u8 = 3;

/// TOML parse error or a config value out of range.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 4;

/// File IO, CSV mapping or batch validation error.
pub const EXIT_RECON_RUNTIME: u8 = 5;

/// The input file had a header but no data rows.
pub const EXIT_RECON_NO_DATA: u8 = 6;
