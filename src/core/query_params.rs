use std::collections::HashMap;

/// Parse `key=value` pairs from a query string or an
/// `application/x-www-form-urlencoded` body.
///
/// Handles URL decoding (including `+` as space) and returns a HashMap of
/// parameter key-value pairs. Multiple values for the same key are not
/// supported (only the last is kept). A leading `?` is ignored.
///
/// # Example
/// ```
/// use chirp::core::query_params::parse_query_params;
///
/// let params = parse_query_params("?max_post=3&page=2");
/// assert_eq!(params.get("max_post"), Some(&"3".to_string()));
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let query = query.strip_prefix('?').unwrap_or(query);

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some(eq_idx) = param.find('=') {
            let key = decode(&param[..eq_idx]);
            let value = decode(&param[eq_idx + 1..]);
            params.insert(key, value);
        } else {
            // Flag parameter without value
            params.insert(decode(param), String::new());
        }
    }

    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Get a string parameter, empty string when absent
pub fn get_string(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).cloned().unwrap_or_default()
}

/// Get a trimmed parameter, `None` when absent or blank
pub fn get_optional(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get a signed integer parameter, `None` when absent or not a number
pub fn get_int(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key).and_then(|s| s.trim().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_form_bodies() {
        let params = parse_query_params("post_content=hello+world%21&repost_val=&loc_lat=1.5");
        assert_eq!(get_string(&params, "post_content"), "hello world!");
        assert_eq!(get_optional(&params, "repost_val"), None);
        assert_eq!(get_optional(&params, "loc_lat").as_deref(), Some("1.5"));
        assert_eq!(get_string(&params, "missing"), "");
    }

    #[test]
    fn keeps_last_value_and_flags() {
        let params = parse_query_params("?page=1&page=3&debug");
        assert_eq!(get_int(&params, "page"), Some(3));
        assert_eq!(params.get("debug"), Some(&String::new()));
    }

    #[test]
    fn non_numeric_int_is_none() {
        let params = parse_query_params("max_post=abc&page=-2");
        assert_eq!(get_int(&params, "max_post"), None);
        assert_eq!(get_int(&params, "page"), Some(-2));
    }
}
