// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const TOKEN_ISSUED: &str = "token.issued";
pub const TOKEN_REJECTED: &str = "token.rejected";
pub const TOKEN_ROTATED: &str = "token.rotated";
pub const TOKEN_REPLAYED: &str = "token.replayed";
pub const API_KEY_REJECTED: &str = "api_key.rejected";
pub const MASTER_KEY_USED: &str = "api_key.master_used";
pub const RATE_LIMITED: &str = "rate_limit.denied";
pub const LOGIN_FAILED: &str = "account.login_failed";
pub const LOGIN_SUCCEEDED: &str = "account.login";
pub const ACCOUNT_REGISTERED: &str = "account.registered";
pub const PASSWORD_RESET: &str = "account.password_reset";
