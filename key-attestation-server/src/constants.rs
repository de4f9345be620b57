/// Default address the server binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 5000;

/// Route accepting attestation requests.
pub const ATTESTATION_ROUTE: &str = "/attestation";

/// Default upper bound, in seconds, for a single verification.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default upper bound for a request body, 256 KiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

/// Message returned when the request body cannot be read as JSON.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON request body";

/// Message returned when a verification does not finish in time.
pub const TIMEOUT_MESSAGE: &str = "Attestation verification timed out";

/// Message returned when the verification task fails.
pub const INTERNAL_ERROR_MESSAGE: &str = "Attestation verification failed unexpectedly";

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";
