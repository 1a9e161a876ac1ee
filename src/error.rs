use std::path::PathBuf;

use thiserror::Error;

/// Startup failures. These are the only errors allowed to stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bot token not configured (set [telegram] bot_token or BOT_TOKEN)")]
    MissingBotToken,

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Why a pre-checkout query was turned down. `Display` is shown to the payer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentRejection {
    #[error("This invoice is unknown or has expired. Please request a new one.")]
    UnknownInvoice,

    #[error("This invoice was issued to a different account.")]
    WrongSender,

    #[error("This invoice has already been paid.")]
    AlreadyPaid,

    #[error("You already have access, no payment needed.")]
    AlreadyAuthenticated,

    #[error("Unexpected currency {got}, expected {expected}.")]
    CurrencyMismatch { expected: String, got: String },

    #[error("Unexpected amount {got}, expected {expected}.")]
    AmountMismatch { expected: u32, got: u32 },

    #[error("Payments are temporarily unavailable. Please try again later.")]
    Unavailable,
}
