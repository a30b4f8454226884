use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Invalid service identifier {service:?}: {reason}")]
    InvalidService { service: String, reason: &'static str },
}

/// A shared environment managed by one server
///
/// `service` is the DNS-SD service type clients browse for, e.g. `_rex._tcp`
/// (RFC 6763 section 7). `name` is free text shown to people; it ends up in
/// the advertised instance name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub service: String,
}

impl Room {
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
        }
    }

    /// Checks that `service` is a usable DNS-SD service type
    pub fn validate(&self) -> Result<(), RoomError> {
        let invalid = |reason| RoomError::InvalidService {
            service: self.service.clone(),
            reason,
        };

        let service = self.service_type();
        let (label, proto) = service
            .split_once('.')
            .ok_or_else(|| invalid("expected <_name>.<_tcp|_udp>"))?;

        if proto != "_tcp" && proto != "_udp" {
            return Err(invalid("protocol must be _tcp or _udp"));
        }

        let name = label
            .strip_prefix('_')
            .ok_or_else(|| invalid("service name must start with an underscore"))?;

        if name.is_empty() || name.len() > 15 {
            return Err(invalid("service name must be 1-15 characters"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("service name may only contain letters, digits and hyphens"));
        }
        if !name.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("service name must contain a letter"));
        }
        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(invalid("service name hyphens must separate other characters"));
        }

        Ok(())
    }

    /// The service type without any `.local.` domain suffix
    pub fn service_type(&self) -> &str {
        let service = self.service.trim_end_matches('.');
        service.strip_suffix(".local").unwrap_or(service)
    }

    /// The fully qualified service type used on the wire, e.g. `_rex._tcp.local.`
    pub fn service_domain(&self) -> String {
        format!("{}.local.", self.service_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("_rex._tcp")]
    #[case("_rex._udp")]
    #[case("_rex-demo._tcp")]
    #[case("_http._tcp.local.")]
    #[case("_a1._tcp")]
    fn test_valid_services(#[case] service: &str) {
        let room = Room::new("REx Demo", service);
        assert_eq!(room.validate(), Ok(()));
    }

    #[rstest]
    #[case("")]
    #[case("rex._tcp")]
    #[case("_rex")]
    #[case("_rex._sctp")]
    #[case("_._tcp")]
    #[case("_averyveryverylongname._tcp")]
    #[case("_rex_demo._tcp")]
    #[case("_123._tcp")]
    #[case("_-rex._tcp")]
    #[case("_re--x._tcp")]
    fn test_invalid_services(#[case] service: &str) {
        let room = Room::new("REx Demo", service);
        assert!(matches!(
            room.validate(),
            Err(RoomError::InvalidService { .. })
        ));
    }

    #[test]
    fn test_service_domain_normalizes_suffix() {
        assert_eq!(Room::new("r", "_rex._tcp").service_domain(), "_rex._tcp.local.");
        assert_eq!(
            Room::new("r", "_rex._tcp.local.").service_domain(),
            "_rex._tcp.local."
        );
        assert_eq!(Room::new("r", "_rex._tcp.local").service_type(), "_rex._tcp");
    }
}
