use std::net::IpAddr;

/// Input validation failures, reported before anything is persisted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Required field is missing or blank
    #[error("Required field '{0}' is missing or empty")]
    RequiredField(String),

    #[error("Invalid format for field '{field}': {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Field '{field}' has {actual} characters, allowed {}..{}",
        .min.map(|m| m.to_string()).unwrap_or_default(),
        .max.map(|m| m.to_string()).unwrap_or_default())]
    InvalidLength {
        field: String,
        min: Option<usize>,
        max: Option<usize>,
        actual: usize,
    },

    #[error("Field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Field checks shared by the agreement manager, audit logger and reports
pub struct Validators;

impl Validators {
    /// Blank (whitespace-only) counts as missing
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::RequiredField(field.to_string()));
        }
        Ok(())
    }

    /// Length in characters, not bytes
    pub fn string_length(
        value: &str,
        field: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<(), ValidationError> {
        let actual = value.chars().count();
        let too_short = min.map(|m| actual < m).unwrap_or(false);
        let too_long = max.map(|m| actual > m).unwrap_or(false);

        if too_short || too_long {
            return Err(ValidationError::InvalidLength {
                field: field.to_string(),
                min,
                max,
                actual,
            });
        }
        Ok(())
    }

    /// IPv4 or IPv6 literal; syntax only
    pub fn ip_address(value: &str, field: &str) -> Result<(), ValidationError> {
        value
            .trim()
            .parse::<IpAddr>()
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidFormat {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }

    /// `end` must not precede `start`
    pub fn ordered_range<T: PartialOrd>(start: &T, end: &T, field: &str) -> Result<(), ValidationError> {
        if end < start {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                reason: "end precedes start".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_missing() {
        assert!(Validators::not_empty("Acme Billing", "associate_name").is_ok());
        assert_eq!(
            Validators::not_empty(" \t", "associate_name"),
            Err(ValidationError::RequiredField("associate_name".to_string()))
        );
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(Validators::string_length("Ünïcødé", "associate_name", Some(1), Some(7)).is_ok());
        assert!(Validators::string_length("", "associate_name", Some(1), None).is_err());

        let err = Validators::string_length("abcdef", "associate_name", None, Some(5)).unwrap_err();
        assert_eq!(err.to_string(), "Field 'associate_name' has 6 characters, allowed ..5");
    }

    #[test]
    fn test_ip_address_syntax() {
        for ok in ["192.168.1.20", "2001:db8::1", "::1", " 10.0.0.1 "] {
            assert!(Validators::ip_address(ok, "ip_address").is_ok(), "{}", ok);
        }
        for bad in ["256.1.1.1", "10.0.0", "localhost", ""] {
            assert!(Validators::ip_address(bad, "ip_address").is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_ordered_range() {
        assert!(Validators::ordered_range(&1, &2, "period").is_ok());
        assert!(Validators::ordered_range(&2, &2, "period").is_ok());
        assert!(matches!(
            Validators::ordered_range(&3, &2, "period"),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
