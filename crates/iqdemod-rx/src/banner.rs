use crate::build_info;

pub fn log_startup_banner() {
    let version = build_info::version();
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let build = build_info::summary();

    tracing::info!(
        target: "iqdemod_banner",
        version,
        os,
        arch,
        timestamp = %timestamp,
        build = build.as_str(),
        "startup"
    );
    tracing::debug!(target = build_info::target(), "build target");
}
