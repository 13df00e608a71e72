//! Storage key constants.

/// Keychain entries owned by the shell.
pub struct StorageKeys;

impl StorageKeys {
    /// 32-byte vault master key (base64).
    pub const VAULT_MASTER_KEY: &'static str = "vault_master_key";
}

/// Environment variable that forces the plaintext fallback.
pub const DISABLE_ENCRYPTION_ENV: &str = "LUMEN_DISABLE_ENCRYPTION";
