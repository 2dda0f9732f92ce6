use std::path::PathBuf;

pub fn system_consent_dir() -> PathBuf {
    PathBuf::from("/var/lib/facegate/privacy")
}

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/facegate/facegate.toml")
}

pub fn system_matcher_socket() -> PathBuf {
    PathBuf::from(crate::service::protocol::SOCKET_PATH)
}
