//! Small helpers shared by the quick-xml based readers

use quick_xml::events::{BytesStart, BytesText};

/// Unescaped value of an attribute, `None` when absent or malformed
pub(crate) fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Local (namespace-stripped) element name
pub(crate) fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

pub(crate) fn text(t: &BytesText) -> String {
    t.unescape()
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned())
}

/// Parse a whitespace separated list of floats
pub(crate) fn parse_floats(s: &str) -> Result<Vec<f32>, std::num::ParseFloatError> {
    s.split_whitespace().map(str::parse::<f32>).collect()
}

/// Parse exactly three whitespace separated floats
pub(crate) fn parse_vec3(s: &str) -> Option<[f32; 3]> {
    let values = parse_floats(s).ok()?;
    match values.as_slice() {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3(" 1 2.5\t-3 "), Some([1.0, 2.5, -3.0]));
        assert_eq!(parse_vec3("1 2"), None);
        assert_eq!(parse_vec3("a b c"), None);
    }
}
