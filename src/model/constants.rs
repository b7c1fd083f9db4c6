/// Environment variable overriding the default price DB directory.
pub const ENV_PRICES_DB: &str = "PRICES_DB";

/// Price DB directory name under the user data directory.
pub const PRICES_DB_DIR: &str = "prices-db";
