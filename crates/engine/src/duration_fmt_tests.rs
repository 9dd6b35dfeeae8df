use super::*;

#[test]
fn parses_milliseconds() {
    assert_eq!(parse_duration("200ms"), Some(Duration::from_millis(200)));
}

#[test]
fn parses_seconds() {
    assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
}

#[test]
fn parses_minutes_and_hours() {
    assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
    assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
}

#[test]
fn rejects_unknown_unit() {
    assert_eq!(parse_duration("10x"), None);
}

#[test]
fn rejects_unparseable_number() {
    assert_eq!(parse_duration("ms"), None);
}

#[test]
fn rejects_negative() {
    assert_eq!(parse_duration("-5s"), None);
}
