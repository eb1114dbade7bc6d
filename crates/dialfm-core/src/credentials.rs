//! `KEY=VALUE` properties file holding the catalog password.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{RadioError, Result};

pub const BASIC_AUTH_PASS: &str = "BASIC_AUTH_PASS";

#[derive(Clone)]
pub struct Credentials {
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RadioError::Config(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
            .map_err(|e| RadioError::Config(format!("{} ({})", e, path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let props = parse_properties(content);
        match props.get(BASIC_AUTH_PASS) {
            Some(p) if !p.is_empty() => Ok(Self {
                password: p.clone(),
            }),
            Some(_) => Err(format!("{} is empty", BASIC_AUTH_PASS)),
            None => Err(format!("{} not set", BASIC_AUTH_PASS)),
        }
    }
}

/// Blank lines and `#`/`!` comments are skipped; lines without `=` are
/// ignored. Later keys win.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            props.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_password() {
        let c = Credentials::parse("# server\nOTHER=1\nBASIC_AUTH_PASS = s3cr=t \n").unwrap();
        assert_eq!(c.password, "s3cr=t");
    }

    #[test]
    fn test_missing_or_empty_password() {
        assert!(Credentials::parse("OTHER=1").is_err());
        assert!(Credentials::parse("BASIC_AUTH_PASS=").is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Credentials::load(&dir.path().join("server.properties")).unwrap_err();
        assert!(matches!(err, RadioError::Config(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_debug_redacts() {
        let c = Credentials {
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", c).contains("hunter2"));
    }
}
