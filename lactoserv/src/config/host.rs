use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `HostConfig` (spec.md §3, §6): hostnames plus exactly one certificate
/// source — caller-supplied PEM chain+key, or a freshly-minted self-signed
/// pair.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct HostConfig {
    pub hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub self_signed: bool,
}

impl HostConfig {
    /// Fails fast at `init` (spec.md §4.5) on the two structural rules
    /// spec.md §1/§6 call out: at least one hostname, and exactly one of
    /// `{certificate+privateKey}` or `selfSigned`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostnames.is_empty() {
            return Err(ConfigError::MissingField("hostnames"));
        }
        let has_pem = self.certificate.is_some() || self.private_key.is_some();
        match (has_pem, self.self_signed) {
            (true, true) => Err(ConfigError::AmbiguousCertSource),
            (false, false) => Err(ConfigError::AmbiguousCertSource),
            (true, false) => {
                if self.certificate.is_none() {
                    return Err(ConfigError::MissingField("certificate"));
                }
                if self.private_key.is_none() {
                    return Err(ConfigError::MissingField("privateKey"));
                }
                Ok(())
            }
            (false, true) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_neither_pem_nor_self_signed() {
        let config = HostConfig { hostnames: vec!["a".into()], ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::AmbiguousCertSource)));
    }

    #[test]
    fn rejects_both_pem_and_self_signed() {
        let config = HostConfig {
            hostnames: vec!["a".into()],
            certificate: Some("cert".into()),
            private_key: Some("key".into()),
            self_signed: true,
        };
        assert!(matches!(config.validate(), Err(ConfigError::AmbiguousCertSource)));
    }

    #[test]
    fn accepts_self_signed_alone() {
        let config = HostConfig { hostnames: vec!["a".into()], self_signed: true, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
