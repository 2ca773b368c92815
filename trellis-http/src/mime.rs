use std::fmt;

/// Media type with its `q` weight, as found in `Accept` headers.
///
/// Weights are stored in thousandths, so `q=0.5` is `500`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimeType {
    type_name: String,
    subtype: String,
    weight: u16,
}

impl MimeType {
    pub fn new(type_name: &str, subtype: &str) -> Self {
        Self {
            type_name: type_name.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            weight: 1000,
        }
    }

    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// Parses a single media range such as `text/html;q=0.8`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim();
        let (type_name, subtype) = essence.split_once('/')?;
        if type_name.is_empty() || subtype.is_empty() {
            return None;
        }
        let mut result = Self::new(type_name.trim(), subtype.trim());
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("q") {
                let quality: f32 = value.trim().parse().ok()?;
                result.weight = (quality.clamp(0.0, 1.0) * 1000.0).round() as u16;
            }
        }
        Some(result)
    }

    /// Parses an `Accept` header, most preferred types first.
    ///
    /// Types with equal weights keep their header order; malformed entries
    /// and entries with `q=0` are dropped.
    pub fn parse_accept(header: &str) -> Vec<Self> {
        let mut result: Vec<_> = header
            .split(',')
            .filter_map(Self::parse)
            .filter(|v| v.weight > 0)
            .collect();
        result.sort_by(|a, b| b.weight.cmp(&a.weight));
        result
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn quality(&self) -> f32 {
        self.weight as f32 / 1000.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.type_name == "*" || self.subtype == "*"
    }

    /// Compares `type/subtype` exactly, ignoring weights.
    pub fn same_essence(&self, other: &MimeType) -> bool {
        self.type_name == other.type_name && self.subtype == other.subtype
    }

    /// Compares `type/subtype`, treating `*` on either side as a match.
    pub fn matches(&self, other: &MimeType) -> bool {
        fn part(a: &str, b: &str) -> bool {
            a == "*" || b == "*" || a == b
        }
        part(&self.type_name, &other.type_name) && part(&self.subtype, &other.subtype)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_name, self.subtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accept() {
        let types = MimeType::parse_accept("text/*;q=0.5, application/json, */*;q=0.1, bad, text/html;q=0");
        let names: Vec<_> = types.iter().map(|v| v.to_string()).collect();
        assert_eq!(names, vec!["application/json", "text/*", "*/*"]);
        assert_eq!(types[1].quality(), 0.5);
    }

    #[test]
    fn test_matches() {
        let json = MimeType::application_json();
        assert!(json.matches(&MimeType::any()));
        assert!(json.matches(&MimeType::parse("application/*").unwrap()));
        assert!(!json.matches(&MimeType::text_plain()));
        assert!(json.same_essence(&MimeType::parse("Application/JSON; charset=utf-8").unwrap()));
    }
}
