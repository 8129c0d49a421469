pub mod auth {
    /// Lifetime of every issued bearer token.
    pub const TOKEN_TTL_HOURS: i64 = 24;

    pub const MIN_PASSWORD_LENGTH: usize = 4;

    pub const BEARER_PREFIX: &str = "Bearer";

    /// Length of passwords generated by `reset-password`.
    pub const GENERATED_PASSWORD_LENGTH: usize = 16;
}

/// Upstream credential headers, lowercase as `http` expects for static names.
pub mod upstream {
    pub const JELLYFIN_TOKEN_HEADER: &str = "x-emby-token";

    pub const ARR_API_KEY_HEADER: &str = "x-api-key";
}
