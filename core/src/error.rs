/// Error taxonomy for platform operations.
///
/// Every variant except `Storage` is a client-facing, recoverable-by-the-caller
/// condition (wrong state or invalid input). `Storage` wraps infrastructure
/// failures as an opaque message; no operation retries — each one either fully
/// applies its mutation or fails outright on a single store round trip.

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformError {
    /// A mining session is already open for this account
    AlreadyMining,
    /// No mining session is open
    NotMining,
    /// Requested amount exceeds the claimable balance
    InsufficientBalance { available: f64, requested: f64 },
    /// Withdrawal amount is under the configured minimum
    BelowMinimum { minimum: f64 },
    /// The named feature is disabled by platform settings
    FeatureDisabled(&'static str),
    /// The withdrawal request has already left the pending state
    AlreadyResolved,
    /// Account or withdrawal request does not exist (or wrong owner)
    NotFound(String),
    /// Destination address failed the length/emptiness bounds
    InvalidAddress(String),
    /// Username or email is already registered
    DuplicateAccount(String),
    /// KYC is already approved; resubmission refused
    KycAlreadyApproved,
    /// Opaque storage failure
    Storage(String),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::AlreadyMining =>
                write!(f, "Mining already active"),
            PlatformError::NotMining =>
                write!(f, "Mining is not active"),
            PlatformError::InsufficientBalance { available, requested } =>
                write!(f, "Insufficient balance: have {} NBX, requested {}", available, requested),
            PlatformError::BelowMinimum { minimum } =>
                write!(f, "Minimum withdrawal amount is {} NBX", minimum),
            PlatformError::FeatureDisabled(feature) =>
                write!(f, "{} is currently disabled", feature),
            PlatformError::AlreadyResolved =>
                write!(f, "Withdrawal request already resolved"),
            PlatformError::NotFound(what) =>
                write!(f, "{} not found", what),
            PlatformError::InvalidAddress(reason) =>
                write!(f, "Invalid wallet address: {}", reason),
            PlatformError::DuplicateAccount(identity) =>
                write!(f, "Account already exists: {}", identity),
            PlatformError::KycAlreadyApproved =>
                write!(f, "KYC already approved"),
            PlatformError::Storage(msg) =>
                write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for PlatformError {}

impl PlatformError {
    /// True for conditions caused by the caller (wrong state or bad input),
    /// false for infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PlatformError::Storage(_))
    }
}
