//! Connectivity probe results and failure classification.
//!
//! Classification only picks a user-facing message. It never decides whether
//! an operation is retried.

/// Result of a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub success: bool,
    pub message: String,
}

impl TestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Probable cause of a failed probe, read from the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Credentials,
    Permission,
    BadUrl,
    Certificate,
    Timeout,
    Unreachable,
    Other,
}

impl FailureKind {
    /// Classify by substring, checked in a fixed order
    pub fn classify(error_text: &str) -> Self {
        const RULES: &[(&[&str], FailureKind)] = &[
            (&["401", "Unauthorized"], FailureKind::Credentials),
            (&["403", "Forbidden"], FailureKind::Permission),
            (&["404", "Not Found"], FailureKind::BadUrl),
            (&["SSL", "Certificate"], FailureKind::Certificate),
            (&["timeout", "Timeout", "timed out"], FailureKind::Timeout),
            (
                &["UnknownHost", "unreachable", "dns error", "Connection failed"],
                FailureKind::Unreachable,
            ),
        ];

        RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|needle| error_text.contains(needle)))
            .map(|(_, kind)| *kind)
            .unwrap_or(FailureKind::Other)
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::Credentials => "Authentication failed: check the username and password",
            FailureKind::Permission => "Access denied: the account cannot use this folder",
            FailureKind::BadUrl => "Address not found: check the server URL",
            FailureKind::Certificate => "Certificate error: the server's TLS certificate was rejected",
            FailureKind::Timeout => "Connection timed out: check the network",
            FailureKind::Unreachable => "Server unreachable: check the address and network",
            FailureKind::Other => "Connection failed",
        }
    }
}

/// Turn a probe error into a user-facing result that keeps the raw error text
pub fn classify_failure(error_text: &str) -> TestResult {
    let kind = FailureKind::classify(error_text);
    TestResult::failed(format!("{} ({})", kind.message(), error_text))
}
