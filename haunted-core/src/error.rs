//! Error types for the HauntedAI core library.
//!
//! Every fallible operation in the crate returns [`HauntedResult`]. Variants carry
//! a stable code so operators can grep logs and API responses for a category.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Database | Connection, query, migration errors |
//! | E2001-E2099 | Config | Environment, config file, and validation errors |
//! | E3001-E3099 | Room | Unknown rooms and lifecycle violations |
//! | E4001-E4099 | Agent | Classified agent service failures |
//! | E5001-E5099 | External | Uploader, reward ledger and HTTP API errors |
//! | E6001-E6099 | Workflow | Cancellation |
//! | E9001-E9099 | General | Internal, IO, serialization, and validation errors |

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{RoomPhase, Stage};

/// Exponential backoff parameters shared by the orchestrator and infrastructure retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry policy for database connects at startup.
    pub fn for_database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Policy with no waiting at all, handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the given failed attempt (0-indexed): 2s, 4s, 8s, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_delay as u64)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// The main error type for the HauntedAI core library.
#[derive(Debug, Error)]
pub enum HauntedError {
    // ========================================================================
    // Database Errors (E1001-E1099)
    // ========================================================================
    /// Failed to establish database connection
    #[error("[E1001] Database connection failed: {message}")]
    DatabaseConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database query execution failed
    #[error("[E1002] Database query failed: {0}")]
    DatabaseQueryFailed(String),

    /// Database migration failed
    #[error("[E1003] Database migration failed: {0}")]
    DatabaseMigrationFailed(String),

    /// Database pool exhausted or unavailable
    #[error("[E1004] Database pool unavailable: {0}")]
    DatabasePoolUnavailable(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Required environment variable is missing
    #[error("[E2001] Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Configuration file parse error
    #[error("[E2002] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2003] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Room Errors (E3001-E3099)
    // ========================================================================
    /// Unknown room identifier
    #[error("[E3001] Room not found: {0}")]
    RoomNotFound(Uuid),

    /// Operation attempted on a room in the wrong lifecycle state
    #[error("[E3002] Room {room_id} is {actual}, expected {expected}")]
    InvalidState {
        room_id: Uuid,
        expected: String,
        actual: RoomPhase,
    },

    /// The requested phase change is not an edge of the state machine
    #[error("[E3003] Invalid room transition from {from} to {to}")]
    InvalidTransition { from: RoomPhase, to: RoomPhase },

    /// Room creation input rejected
    #[error("[E3004] Invalid room input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Agent Errors (E4001-E4099)
    // ========================================================================
    /// Retryable agent failure (timeout, 5xx, 429)
    #[error("[E4001] Transient failure in {stage} agent: {message}")]
    AgentTransient { stage: Stage, message: String },

    /// Non-retryable agent failure (validation error, malformed response)
    #[error("[E4002] Permanent failure in {stage} agent: {message}")]
    AgentPermanent { stage: Stage, message: String },

    /// No client registered for a stage of the workflow
    #[error("[E4003] No agent registered for stage: {0}")]
    AgentNotRegistered(Stage),

    // ========================================================================
    // External Collaborator Errors (E5001-E5099)
    // ========================================================================
    /// Content upload failed
    #[error("[E5001] Upload failed: {message}")]
    UploadFailed { message: String, transient: bool },

    /// Content identifier failed validation
    #[error("[E5002] Invalid content identifier: {0}")]
    InvalidContentId(String),

    /// Reward ledger rejected or failed a credit
    #[error("[E5003] Reward issuance failed: {0}")]
    RewardFailed(String),

    /// Outbound HTTP request failed
    #[error("[E5004] API request failed: {0}")]
    ApiRequestFailed(String),

    /// Outbound HTTP response could not be parsed
    #[error("[E5005] Failed to parse API response: {0}")]
    ApiParseError(String),

    /// Outbound HTTP request timed out
    #[error("[E5006] Request timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // Workflow Errors (E6001-E6099)
    // ========================================================================
    /// Room was cancelled by a user or operator
    #[error("[E6001] Room {0} was cancelled")]
    Cancelled(Uuid),

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("[E9002] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[E9003] Serialization error: {0}")]
    SerializationError(String),

    /// Validation error
    #[error("[E9004] Validation error: {0}")]
    ValidationError(String),
}

impl HauntedError {
    /// Create a database connection error from a string message.
    pub fn database_connection_failed(message: impl Into<String>) -> Self {
        HauntedError::DatabaseConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_state(room_id: Uuid, expected: impl Into<String>, actual: RoomPhase) -> Self {
        HauntedError::InvalidState {
            room_id,
            expected: expected.into(),
            actual,
        }
    }
}

/// Result type alias for HauntedAI operations.
pub type HauntedResult<T> = Result<T, HauntedError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<sqlx::Error> for HauntedError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => HauntedError::DatabasePoolUnavailable(err.to_string()),
            sqlx::Error::PoolClosed => {
                HauntedError::DatabasePoolUnavailable("Connection pool is closed".to_string())
            }
            sqlx::Error::Configuration(_) => {
                HauntedError::database_connection_failed(err.to_string())
            }
            sqlx::Error::Io(_) => HauntedError::database_connection_failed(err.to_string()),
            _ => HauntedError::DatabaseQueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for HauntedError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        HauntedError::DatabaseMigrationFailed(err.to_string())
    }
}

impl From<reqwest::Error> for HauntedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HauntedError::Timeout(err.to_string())
        } else if err.is_decode() {
            HauntedError::ApiParseError(err.to_string())
        } else {
            HauntedError::ApiRequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HauntedError {
    fn from(err: serde_json::Error) -> Self {
        HauntedError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for HauntedError {
    fn from(err: std::io::Error) -> Self {
        HauntedError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for HauntedError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => HauntedError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => HauntedError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            _ => HauntedError::ConfigParseError(err.to_string()),
        }
    }
}

impl From<crate::db::DatabaseError> for HauntedError {
    fn from(err: crate::db::DatabaseError) -> Self {
        match err {
            crate::db::DatabaseError::MissingEnvVar(name) => HauntedError::MissingEnvVar(name),
            crate::db::DatabaseError::ConnectionFailed(e) => HauntedError::from(e),
            crate::db::DatabaseError::MigrationFailed(e) => {
                HauntedError::DatabaseMigrationFailed(e.to_string())
            }
            crate::db::DatabaseError::InvalidConfig(msg) => HauntedError::InvalidConfigValue {
                key: "database".to_string(),
                message: msg,
            },
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl HauntedError {
    /// Returns true if this error is related to database operations.
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            HauntedError::DatabaseConnectionFailed { .. }
                | HauntedError::DatabaseQueryFailed(_)
                | HauntedError::DatabaseMigrationFailed(_)
                | HauntedError::DatabasePoolUnavailable(_)
        )
    }

    /// Returns true if this error is a room lifecycle violation.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            HauntedError::InvalidState { .. } | HauntedError::InvalidTransition { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HauntedError::RoomNotFound(_))
    }

    /// Returns true if this error is transient and the operation might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HauntedError::DatabasePoolUnavailable(_)
                | HauntedError::DatabaseConnectionFailed { .. }
                | HauntedError::AgentTransient { .. }
                | HauntedError::UploadFailed {
                    transient: true,
                    ..
                }
                | HauntedError::ApiRequestFailed(_)
                | HauntedError::Timeout(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            HauntedError::DatabaseConnectionFailed { .. } => "E1001",
            HauntedError::DatabaseQueryFailed(_) => "E1002",
            HauntedError::DatabaseMigrationFailed(_) => "E1003",
            HauntedError::DatabasePoolUnavailable(_) => "E1004",
            HauntedError::MissingEnvVar(_) => "E2001",
            HauntedError::ConfigParseError(_) => "E2002",
            HauntedError::InvalidConfigValue { .. } => "E2003",
            HauntedError::RoomNotFound(_) => "E3001",
            HauntedError::InvalidState { .. } => "E3002",
            HauntedError::InvalidTransition { .. } => "E3003",
            HauntedError::InvalidInput(_) => "E3004",
            HauntedError::AgentTransient { .. } => "E4001",
            HauntedError::AgentPermanent { .. } => "E4002",
            HauntedError::AgentNotRegistered(_) => "E4003",
            HauntedError::UploadFailed { .. } => "E5001",
            HauntedError::InvalidContentId(_) => "E5002",
            HauntedError::RewardFailed(_) => "E5003",
            HauntedError::ApiRequestFailed(_) => "E5004",
            HauntedError::ApiParseError(_) => "E5005",
            HauntedError::Timeout(_) => "E5006",
            HauntedError::Cancelled(_) => "E6001",
            HauntedError::Internal(_) => "E9001",
            HauntedError::IoError(_) => "E9002",
            HauntedError::SerializationError(_) => "E9003",
            HauntedError::ValidationError(_) => "E9004",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            HauntedError::DatabaseConnectionFailed { .. } => {
                Some("Check that PostgreSQL is running and DATABASE_URL is correct")
            }
            HauntedError::MissingEnvVar(_) => {
                Some("Create a .env file or set the environment variable")
            }
            HauntedError::RoomNotFound(_) => {
                Some("Run 'haunted rooms list --owner <id>' to see existing rooms")
            }
            HauntedError::InvalidState { .. } => {
                Some("Only idle rooms can be started and only running rooms can be cancelled")
            }
            HauntedError::AgentNotRegistered(_) => {
                Some("Configure an endpoint for every stage under [agents] in haunted.toml")
            }
            HauntedError::AgentTransient { .. } | HauntedError::Timeout(_) => {
                Some("The agent service may be overloaded. Check its health and try a new room")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// Retry utilities
// ============================================================================

/// Execute an async operation, retrying transient failures according to `policy`.
///
/// Agent calls do not go through here; the orchestrator owns their retry loop.
pub async fn retry_async_with_policy<F, Fut, T>(
    operation: F,
    policy: &RetryPolicy,
) -> HauntedResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = HauntedResult<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt + 1,
                        attempt
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || !policy.should_retry(attempt + 1) {
                    e.log();
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with suggestions.
pub struct CliErrorDisplay<'a> {
    error: &'a HauntedError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a HauntedError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl fmt::Display for CliErrorDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_error_display() {
        let room_id = Uuid::new_v4();
        let err = HauntedError::RoomNotFound(room_id);
        assert!(err.to_string().contains("E3001"));
        assert!(err.to_string().contains(&room_id.to_string()));

        let err = HauntedError::invalid_state(room_id, "idle", RoomPhase::Running(Stage::Code));
        assert!(err.to_string().contains("E3002"));
        assert!(err.to_string().contains("running_code"));
    }

    #[test]
    fn test_error_categorization() {
        let db_err = HauntedError::database_connection_failed("timeout");
        assert!(db_err.is_database_error());
        assert!(!db_err.is_state_error());

        let state_err = HauntedError::InvalidTransition {
            from: RoomPhase::Done,
            to: RoomPhase::Idle,
        };
        assert!(state_err.is_state_error());
        assert!(!state_err.is_database_error());

        assert!(HauntedError::RoomNotFound(Uuid::new_v4()).is_not_found());
    }

    #[test]
    fn test_is_transient() {
        assert!(HauntedError::AgentTransient {
            stage: Stage::Asset,
            message: "HTTP 503".to_string()
        }
        .is_transient());
        assert!(HauntedError::Timeout("story agent".to_string()).is_transient());
        assert!(HauntedError::UploadFailed {
            message: "HTTP 502".to_string(),
            transient: true
        }
        .is_transient());

        assert!(!HauntedError::AgentPermanent {
            stage: Stage::Code,
            message: "HTTP 400".to_string()
        }
        .is_transient());
        assert!(!HauntedError::UploadFailed {
            message: "HTTP 413".to_string(),
            transient: false
        }
        .is_transient());
        assert!(!HauntedError::Cancelled(Uuid::new_v4()).is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            HauntedError::database_connection_failed("err").error_code(),
            "E1001"
        );
        assert_eq!(
            HauntedError::MissingEnvVar("KEY".to_string()).error_code(),
            "E2001"
        );
        assert_eq!(
            HauntedError::RoomNotFound(Uuid::new_v4()).error_code(),
            "E3001"
        );
        assert_eq!(
            HauntedError::AgentNotRegistered(Stage::Deploy).error_code(),
            "E4003"
        );
        assert_eq!(
            HauntedError::RewardFailed("ledger down".to_string()).error_code(),
            "E5003"
        );
        assert_eq!(
            HauntedError::Cancelled(Uuid::new_v4()).error_code(),
            "E6001"
        );
        assert_eq!(
            HauntedError::Internal("err".to_string()).error_code(),
            "E9001"
        );
    }

    #[test]
    fn test_retry_delay_calculation() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_retry_async_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = retry_async_with_policy(
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HauntedError::DatabasePoolUnavailable("busy".to_string()))
                } else {
                    Ok(42)
                }
            },
            &RetryPolicy::immediate(3),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_async_stops_on_permanent() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: HauntedResult<()> = retry_async_with_policy(
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HauntedError::ValidationError("bad".to_string()))
            },
            &RetryPolicy::immediate(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let haunted_err: HauntedError = io_err.into();
        assert!(matches!(haunted_err, HauntedError::IoError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_result: Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let json_err = json_result.unwrap_err();
        let haunted_err: HauntedError = json_err.into();
        assert!(matches!(haunted_err, HauntedError::SerializationError(_)));
    }

    #[test]
    fn test_cli_error_display() {
        let err = HauntedError::MissingEnvVar("DATABASE_URL".to_string());
        let output = CliErrorDisplay::new(&err).to_string();

        assert!(output.contains("DATABASE_URL"));
        assert!(output.contains("Suggestion"));

        let output = CliErrorDisplay::new(&err).without_suggestion().to_string();
        assert!(!output.contains("Suggestion"));
    }
}
