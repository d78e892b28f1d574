//! Configuration validation logic.

use super::TlsConfig;

pub(super) fn validate_port(port: u16) -> Result<(), String> {
    if port == 0 {
        return Err("PORT must be between 1 and 65535".to_string());
    }
    Ok(())
}

pub(super) fn validate_live_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("Live path must start with '/': {path}"));
    }
    if path.len() == 1 {
        return Err("Live path cannot be the root path".to_string());
    }
    Ok(())
}

pub(super) fn validate_tls(tls: &Option<TlsConfig>) -> Result<(), String> {
    let Some(tls) = tls else {
        return Ok(());
    };
    if !tls.cert_path.exists() {
        return Err(format!(
            "TLS certificate file not found: {}",
            tls.cert_path.display()
        ));
    }
    if !tls.key_path.exists() {
        return Err(format!(
            "TLS private key file not found: {}",
            tls.key_path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_port() {
        assert!(validate_port(0).is_err());
        assert!(validate_port(3001).is_ok());
    }

    #[test]
    fn test_validate_live_path() {
        assert!(validate_live_path("/ws/gemini-live").is_ok());
        assert!(validate_live_path("ws/gemini-live").is_err());
        assert!(validate_live_path("/").is_err());
    }

    #[test]
    fn test_validate_tls() {
        assert!(validate_tls(&None).is_ok());

        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let present = Some(TlsConfig {
            cert_path: cert.path().to_path_buf(),
            key_path: key.path().to_path_buf(),
        });
        assert!(validate_tls(&present).is_ok());

        let missing = Some(TlsConfig {
            cert_path: cert.path().to_path_buf(),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        });
        assert!(validate_tls(&missing).unwrap_err().contains("private key"));
    }
}
