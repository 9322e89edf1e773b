//! MQTT topic filter matching

const SEP: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Whether `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level and
/// any number of child levels. Wildcards in the first level never match
/// topics starting with `$`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with(SINGLE_LEVEL) || filter.starts_with(MULTI_LEVEL)) {
        return false;
    }

    let mut topic_levels = topic.split(SEP);
    for level in filter.split(SEP) {
        if level == MULTI_LEVEL {
            return true;
        }
        match topic_levels.next() {
            Some(t) if level == SINGLE_LEVEL || level == t => {}
            _ => return false,
        }
    }
    topic_levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pico-cs/#", "pico-cs/loco/br01/speed", true)]
    #[case("pico-cs/#", "pico-cs", true)]
    #[case("pico-cs/#", "other/loco", false)]
    #[case("pico-cs/+/br01/speed", "pico-cs/loco/br01/speed", true)]
    #[case("pico-cs/+/br01/speed", "pico-cs/loco/br01/dir", false)]
    #[case("pico-cs/loco/+", "pico-cs/loco/br01/speed", false)]
    #[case("pico-cs/loco/br01", "pico-cs/loco/br01", true)]
    #[case("pico-cs/loco/br01", "pico-cs/loco/br01/speed", false)]
    #[case("#", "$SYS/broker/uptime", false)]
    #[case("+/broker/uptime", "$SYS/broker/uptime", false)]
    #[case("$SYS/#", "$SYS/broker/uptime", true)]
    fn test_topic_matches(#[case] filter: &str, #[case] topic: &str, #[case] expected: bool) {
        assert_eq!(topic_matches(filter, topic), expected);
    }
}
