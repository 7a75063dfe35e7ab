use crate::app::ports::{FormFields, HttpResponse};
use crate::common::constants::{STATE_FIELD, STATE_SUCCESS};
use crate::common::error::{IntegratorError, Result};
use serde_json::Value;

/// Check that an IPED response can be trusted.
///
/// Rejects a non-200 status, a body without `STATE`, a `STATE` other than
/// `1`, and a body missing any of `required`. The error carries the status
/// and the raw body.
pub fn validate_response(status: u16, raw: &str, body: &Value, required: &[&str]) -> Result<()> {
    if status != 200 {
        return Err(IntegratorError::response(status, raw, "HTTP status is not 200"));
    }

    let state = body
        .get(STATE_FIELD)
        .ok_or_else(|| IntegratorError::response(status, raw, "body has no STATE field"))?;
    // any JSON number equal to 1 counts, so `1.0` passes and `"1"` does not
    if state.as_f64() != Some(STATE_SUCCESS as f64) {
        return Err(IntegratorError::response(
            status,
            raw,
            format!("STATE is {state}, expected {STATE_SUCCESS}"),
        ));
    }

    if let Some(missing) = required.iter().find(|key| body.get(**key).is_none()) {
        return Err(IntegratorError::response(
            status,
            raw,
            format!("body has no required field {missing}"),
        ));
    }
    Ok(())
}

/// Decode the response body and validate it, returning the trusted JSON.
pub fn decode_and_validate(response: &HttpResponse, required: &[&str]) -> Result<Value> {
    if response.status != 200 {
        return Err(IntegratorError::response(
            response.status,
            response.body.as_str(),
            "HTTP status is not 200",
        ));
    }
    let body: Value = serde_json::from_str(&response.body).map_err(|e| {
        IntegratorError::response(
            response.status,
            response.body.as_str(),
            format!("body is not valid JSON: {e}"),
        )
    })?;
    validate_response(response.status, &response.body, &body, required)?;
    Ok(body)
}

/// Append `values` as an indexed array parameter: `key[0]=…`, `key[1]=…`.
pub fn push_array_param<T: ToString>(form: &mut FormFields, key: &str, values: &[T]) {
    for (index, value) in values.iter().enumerate() {
        form.push((format!("{key}[{index}]"), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(status: u16, body: Value, required: &[&str]) -> Result<()> {
        validate_response(status, &body.to_string(), &body, required)
    }

    #[test]
    fn test_rejects_non_200_status() {
        let err = check(500, json!({"STATE": 1}), &[]).unwrap_err();
        match err {
            IntegratorError::Response { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("STATE"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_rejects_missing_state() {
        let err = check(200, json!({}), &[]).unwrap_err();
        assert!(err.to_string().contains("STATE"));
    }

    #[test]
    fn test_rejects_every_state_other_than_one() {
        for state in [json!(0), json!(2), json!(-1), json!(1.5), json!("1"), json!(null), json!(true)] {
            assert!(
                check(200, json!({"STATE": state, "USERS": []}), &["USERS"]).is_err(),
                "STATE {state} should be rejected"
            );
        }
    }

    #[test]
    fn test_accepts_float_state_one() {
        check(200, json!({"STATE": 1.0, "USERS": []}), &["USERS"]).unwrap();
    }

    #[test]
    fn test_rejects_missing_required_field() {
        let err = check(200, json!({"STATE": 1}), &["STATE", "MANDATORY_KEY"]).unwrap_err();
        assert!(err.to_string().contains("MANDATORY_KEY"));
    }

    #[test]
    fn test_accepts_success_with_all_required_fields() {
        let body = json!({"STATE": 1, "COURSES": [], "CURRENT_PAGE": 1, "TOTAL_PAGES": 1});
        check(200, body, &["COURSES", "CURRENT_PAGE", "TOTAL_PAGES"]).unwrap();
    }

    #[test]
    fn test_decode_rejects_non_json_body() {
        let err = decode_and_validate(&HttpResponse::new(200, "<html>"), &[]).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_decode_reports_status_before_parsing() {
        let err = decode_and_validate(&HttpResponse::new(502, "<html>bad gateway</html>"), &[])
            .unwrap_err();
        assert!(matches!(err, IntegratorError::Response { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_push_array_param() {
        let mut form: FormFields = vec![("api_version".into(), "2".into())];
        push_array_param(&mut form, "course_id", &[10, 20]);
        assert_eq!(
            form,
            vec![
                ("api_version".to_string(), "2".to_string()),
                ("course_id[0]".to_string(), "10".to_string()),
                ("course_id[1]".to_string(), "20".to_string()),
            ]
        );
    }
}
