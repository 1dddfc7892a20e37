pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn build_source() -> &'static str {
    option_env!("IQDEMOD_BUILD_SOURCE").unwrap_or("unknown")
}

pub fn features() -> &'static str {
    option_env!("IQDEMOD_FEATURES").unwrap_or("")
}

pub fn profile() -> &'static str {
    option_env!("IQDEMOD_PROFILE").unwrap_or("release")
}

pub fn target() -> &'static str {
    option_env!("IQDEMOD_TARGET").unwrap_or("")
}

pub fn git_commit() -> Option<&'static str> {
    option_env!("IQDEMOD_GIT_COMMIT")
}

pub fn git_dirty() -> Option<bool> {
    option_env!("IQDEMOD_GIT_DIRTY").and_then(|s| match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    })
}

/// One-line build description for the startup banner, e.g.
/// `git:1a2b3c4d5e6f-dirty release soapysdr`.
pub fn summary() -> String {
    if let Some(build) = option_env!("IQDEMOD_BUILD") {
        return build.to_string();
    }

    let mut parts = Vec::new();
    match git_commit() {
        Some(commit) if git_dirty() == Some(true) => {
            parts.push(format!("{}:{commit}-dirty", build_source()))
        }
        Some(commit) => parts.push(format!("{}:{commit}", build_source())),
        None => parts.push(build_source().to_string()),
    }
    parts.push(profile().to_string());
    if !features().is_empty() {
        parts.push(features().to_string());
    }
    parts.join(" ")
}
