use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::{ApiError, FieldErrors};

/// Groups validator failures by field with human-readable messages. Nested
/// request structs report their fields at the top level.
pub fn field_messages(errors: &ValidationErrors) -> FieldErrors {
    let mut grouped = FieldErrors::new();
    collect(errors, &mut grouped);
    grouped
}

fn collect(errors: &ValidationErrors, grouped: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(failures) => {
                let messages = failures.iter().map(|failure| describe(field, failure)).collect();
                grouped.insert(field.to_string(), messages);
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, grouped),
            ValidationErrorsKind::List(items) => items.values().for_each(|nested| collect(nested, grouped)),
        }
    }
}

fn describe(field: &str, failure: &ValidationError) -> String {
    let param = |name: &str| failure.params.get(name).map(bound);
    match failure.code.as_ref() {
        "required" => required(field),
        "email" => format!("'{}' must be a valid email address", field),
        "url" => format!("'{}' must be a valid URL", field),
        "length" => match (param("equal"), param("min"), param("max")) {
            (Some(n), _, _) => format!("'{}' must be exactly {} characters", field, n),
            // A value shorter than min is the more useful message when both bounds exist.
            (None, Some(min), _) if too_short(failure, &min) => at_least(field, &min),
            (None, _, Some(max)) => no_more_than(field, &max),
            (None, Some(min), None) => at_least(field, &min),
            (None, None, None) => invalid(field),
        },
        "range" => match param("min") {
            Some(min) => format!("'{}' must be at least {}", field, min),
            None => invalid(field),
        },
        _ => invalid(field),
    }
}

/// Numeric bounds arrive as floats; `1.0` reads as `1`.
fn bound(value: &serde_json::Value) -> String {
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        _ => value.to_string(),
    }
}

fn too_short(failure: &ValidationError, min: &str) -> bool {
    let min: usize = min.parse().unwrap_or(0);
    failure
        .params
        .get("value")
        .and_then(|v| v.as_str())
        .map(|v| v.chars().count() < min)
        .unwrap_or(true)
}

fn required(field: &str) -> String {
    format!("'{}' is required", field)
}

fn at_least(field: &str, n: &str) -> String {
    format!("'{}' must have at least {} characters", field, n)
}

fn no_more_than(field: &str, n: &str) -> String {
    format!("'{}' must have no more than {} characters", field, n)
}

fn invalid(field: &str) -> String {
    format!("Field '{}' is invalid", field)
}

/// Field checks for bodies whose field names are only known at runtime.
#[derive(Debug, Default)]
pub struct Checks {
    errors: FieldErrors,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Present, non-blank and within `min..=max` characters once trimmed.
    pub fn text(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) -> &mut Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return self.fail(field, required(field));
        };
        let len = value.chars().count();
        if len < min {
            self.fail(field, at_least(field, &min.to_string()));
        } else if len > max {
            self.fail(field, no_more_than(field, &max.to_string()));
        }
        self
    }

    /// Present and positive.
    pub fn id(&mut self, field: &str, value: Option<i64>) -> &mut Self {
        match value {
            Some(id) if id > 0 => self,
            _ => self.fail(field, required(field)),
        }
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error(std::mem::take(&mut self.errors)))
        }
    }

    fn fail(&mut self, field: &str, message: String) -> &mut Self {
        self.errors.entry(field.to_string()).or_default().push(message);
        self
    }
}

/// Names are stored trimmed.
pub fn clean_name(raw: &str) -> String {
    raw.trim().to_string()
}

/// Free text is trimmed and HTML-escaped before storage.
pub fn clean_text(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;

    fn failure(code: &'static str, params: &[(&'static str, serde_json::Value)]) -> ValidationError {
        let mut error = ValidationError::new(code);
        for (name, value) in params {
            error.add_param(Cow::Borrowed(*name), value);
        }
        error
    }

    #[test]
    fn messages_follow_field_format() {
        let mut errors = ValidationErrors::new();
        errors.add("Email", failure("email", &[]));
        errors.add("Password", failure("length", &[("min", json!(8)), ("value", json!("abc"))]));
        errors.add("FirstName", failure("required", &[]));

        let grouped = field_messages(&errors);
        assert_eq!(grouped["Email"], vec!["'Email' must be a valid email address"]);
        assert_eq!(grouped["Password"], vec!["'Password' must have at least 8 characters"]);
        assert_eq!(grouped["FirstName"], vec!["'FirstName' is required"]);
    }

    #[test]
    fn long_value_reports_maximum() {
        let long = "x".repeat(120);
        let mut errors = ValidationErrors::new();
        errors.add("GroupName", failure("length", &[("min", json!(3)), ("max", json!(100)), ("value", json!(long))]));
        assert_eq!(field_messages(&errors)["GroupName"], vec!["'GroupName' must have no more than 100 characters"]);
    }

    #[test]
    fn runtime_checks_collect_per_field() {
        let err = Checks::new()
            .text("CountryName", Some("  ke "), 3, 100)
            .id("CountryID", Some(0))
            .finish()
            .unwrap_err();
        assert_eq!(
            err.to_json(),
            json!({ "validation_errors": {
                "CountryName": ["'CountryName' must have at least 3 characters"],
                "CountryID": ["'CountryID' is required"]
            }})
        );
        assert!(Checks::new().text("CountryName", Some("Kenya"), 3, 100).finish().is_ok());
    }

    #[test]
    fn range_bounds_print_as_whole_numbers() {
        let min_one = failure("range", &[("min", json!(1.0)), ("value", json!(0))]);
        assert_eq!(describe("Term", &min_one), "'Term' must be at least 1");

        let fractional = failure("range", &[("min", json!(0.5))]);
        assert_eq!(describe("Rate", &fractional), "'Rate' must be at least 0.5");
    }

    #[test]
    fn text_is_trimmed_and_escaped() {
        assert_eq!(clean_name("  Nairobi "), "Nairobi");
        assert_eq!(clean_text(" <b>school fees</b> & 'books' "), "&lt;b&gt;school fees&lt;/b&gt; &amp; &#39;books&#39;");
    }
}
