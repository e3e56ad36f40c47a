use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_whitespace<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for part in parts {
        for word in part.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Strip interface chrome ("Like", "Reply", ...) from either end of a text.
///
/// Matching is case-sensitive and on whole words, so "I like this" survives.
pub fn strip_noise(text: &str, noise_phrases: &[String]) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    let phrases: Vec<Vec<&str>> = noise_phrases
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>())
        .filter(|p| !p.is_empty())
        .collect();

    loop {
        let before = words.len();
        for phrase in &phrases {
            while words.len() >= phrase.len() && words[words.len() - phrase.len()..] == phrase[..] {
                words.truncate(words.len() - phrase.len());
            }
            while words.len() >= phrase.len() && words[..phrase.len()] == phrase[..] {
                words.drain(..phrase.len());
            }
        }
        if words.len() == before {
            break;
        }
    }

    words.join(" ")
}

/// Best-effort timestamp parsing for the formats comment widgets use
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = raw.parse().ok()?;
        return if raw.len() >= 13 {
            DateTime::from_timestamp_millis(value)
        } else {
            DateTime::from_timestamp(value, 0)
        };
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noise() -> Vec<String> {
        ["Like", "Reply", "Share", "See Translation"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace(["  hello\n", "\tworld  ", ""]),
            "hello world"
        );
        assert_eq!(normalize_whitespace(["   "]), "");
    }

    #[test]
    fn test_strip_noise_trailing_controls() {
        assert_eq!(
            strip_noise("Great post! Like Reply Share", &noise()),
            "Great post!"
        );
        assert_eq!(
            strip_noise("Bonjour See Translation", &noise()),
            "Bonjour"
        );
    }

    #[test]
    fn test_strip_noise_keeps_inner_words() {
        assert_eq!(
            strip_noise("I Like this a lot", &noise()),
            "I Like this a lot"
        );
    }

    #[test]
    fn test_strip_noise_only_noise_is_empty() {
        assert_eq!(strip_noise("Like Reply", &noise()), "");
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_unix_seconds_and_millis() {
        let secs = parse_timestamp("1700000000").unwrap();
        let millis = parse_timestamp("1700000000000").unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_naive_formats() {
        assert_eq!(
            parse_timestamp("2024-01-02 03:04:05"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(
            parse_timestamp("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_relative_is_unparsed() {
        assert_eq!(parse_timestamp("2h"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
