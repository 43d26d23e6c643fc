//! Formatting helpers shared by the wallet logs and the CLI.

/// Token amount formatting
pub mod index;

pub use index::format_token_amount;
