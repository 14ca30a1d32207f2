mod raw {
    // See https://docs.rs/built/latest/built/index.html for the full list of constants.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Crate version such as 0.1.0
pub const PKG_VERSION: &str = raw::PKG_VERSION;

/// Comma separated features enabled for this build
pub const FEATURES: &str = raw::FEATURES_STR;

/// `release` or `debug`
pub const PROFILE: &str = raw::PROFILE;

lazy_static! {
    /// Git version such as a96e8f991c91a81df51e7975849441f52fdbcdcc, or a96e8f991c91a81df51e7975849441f52fdbcdcc-dirty,
    /// or unknown-git-version if the harness is not built from a git repo.
    pub static ref GIT_VERSION: &'static str = &GIT_VERSION_STRING;

    static ref GIT_VERSION_STRING: String = match (raw::GIT_COMMIT_HASH, raw::GIT_DIRTY) {
        (Some(hash), Some(true)) => format!("{}-dirty", hash),
        (Some(hash), _) => hash.to_string(),
        (None, _) => "unknown-git-version".to_string(),
    };
}
