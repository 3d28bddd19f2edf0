use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn require_id(field: &'static str, id: Id) -> Result<(), EngineError> {
    if id <= 0 {
        return Err(EngineError::InvalidField {
            field,
            reason: "must be a positive identifier",
        });
    }
    Ok(())
}

/// Non-blank and at most `max` bytes.
pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
    too_long: &'static str,
) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max {
        return Err(EngineError::LimitExceeded(too_long));
    }
    Ok(())
}

pub(crate) fn require_email(value: &str) -> Result<(), EngineError> {
    const FIELD: &str = "email";
    if value.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    let malformed = EngineError::InvalidField {
        field: FIELD,
        reason: "must look like name@domain.tld",
    };
    if value.chars().any(char::is_whitespace) {
        return Err(malformed);
    }
    let Some((local, domain)) = value.split_once('@') else {
        return Err(malformed);
    };
    let dotted = domain
        .rsplit_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());
    if local.is_empty() || domain.contains('@') || !dotted {
        return Err(malformed);
    }
    Ok(())
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// `[start, end)` as a span, or `InvalidInterval`.
pub(crate) fn interval(start: Ms, end: Ms) -> Result<Span, EngineError> {
    Span::checked(start, end).ok_or(EngineError::InvalidInterval { start, end })
}

pub(crate) fn validate_title(title: &str) -> Result<(), EngineError> {
    require_text("title", title, MAX_TITLE_LEN, "title too long")
}

pub(crate) fn validate_description(description: Option<&str>) -> Result<(), EngineError> {
    match description {
        Some(d) if d.len() > MAX_DESCRIPTION_LEN => {
            Err(EngineError::LimitExceeded("description too long"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(require_email("ana@uni.edu").is_ok());
        assert!(require_email("a.b+c@mail.example.org").is_ok());
        for bad in ["", "ana", "@uni.edu", "ana@", "ana@uni", "ana@.edu", "ana@uni.", "a na@uni.edu", "a@b@c.d"] {
            assert!(
                matches!(require_email(bad), Err(EngineError::InvalidField { field: "email", .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn blank_text_is_invalid_and_long_text_is_a_limit() {
        assert!(matches!(
            validate_title("   "),
            Err(EngineError::InvalidField { field: "title", .. })
        ));
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(validate_title(&long), Err(EngineError::LimitExceeded(_))));
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
    }

    #[test]
    fn non_positive_ids_rejected() {
        assert!(require_id("room_id", 1).is_ok());
        assert!(require_id("room_id", 0).is_err());
        assert!(require_id("room_id", -4).is_err());
    }

    #[test]
    fn timestamps_outside_calendar_range() {
        assert!(validate_span(&Span::new(0, 1)).is_ok());
        assert!(validate_span(&Span::new(-1, 1)).is_err());
        assert!(validate_span(&Span::new(0, MAX_VALID_TIMESTAMP_MS + 1)).is_err());
    }
}
