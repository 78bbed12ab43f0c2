use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[A-Za-z0-9_-]+").unwrap());

const MONTHS_RU: [&str; 12] = [
    "янв.", "февр.", "мар.", "апр.", "мая", "июн.", "июл.", "авг.", "сент.", "окт.", "нояб.",
    "дек.",
];

/// Relative-time label for a timestamp against the ticker's "now" (unix
/// millis). Unparseable or empty timestamps render as empty.
pub fn rel_time(timestamp: &str, now_ms: i64) -> String {
    let Some(moment) = parse_timestamp(timestamp) else {
        return String::new();
    };
    let diff = ((now_ms - moment.timestamp_millis()) / 1000).max(0);

    if diff < 60 {
        return "только что".to_string();
    }
    if diff < 3600 {
        return format!("{} мин. назад", diff / 60);
    }
    if diff < 86_400 {
        return format!("{} ч. назад", diff / 3600);
    }
    if diff < 604_800 {
        return format!("{} дн. назад", diff / 86_400);
    }

    use chrono::Datelike;
    let month = MONTHS_RU[moment.month0() as usize];
    format!("{} {} {} г.", moment.day(), month, moment.year())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // The backend emits naive ISO timestamps without an offset.
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Mention(String),
}

/// Splits a comment body into plain text and `@username` mentions, in
/// order, so mentions can be rendered as profile links.
pub fn split_mentions(text: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut cursor = 0;
    for found in MENTION_RE.find_iter(text) {
        if found.start() > cursor {
            fragments.push(Fragment::Text(text[cursor..found.start()].to_string()));
        }
        fragments.push(Fragment::Mention(
            found.as_str().trim_start_matches('@').to_string(),
        ));
        cursor = found.end();
    }
    if cursor < text.len() {
        fragments.push(Fragment::Text(text[cursor..].to_string()));
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(iso: &str) -> i64 {
        parse_timestamp(iso).unwrap().timestamp_millis()
    }

    #[test]
    fn buckets() {
        let base = "2026-08-30T12:00:00";
        assert_eq!(rel_time(base, ms(base) + 30_000), "только что");
        assert_eq!(rel_time(base, ms(base) + 5 * 60_000), "5 мин. назад");
        assert_eq!(rel_time(base, ms(base) + 3 * 3_600_000), "3 ч. назад");
        assert_eq!(rel_time(base, ms(base) + 2 * 86_400_000), "2 дн. назад");
    }

    #[test]
    fn old_timestamps_render_as_dates() {
        let now = chrono::Utc
            .with_ymd_and_hms(2026, 8, 30, 12, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(rel_time("2023-10-27T23:30:00", now), "27 окт. 2023 г.");
    }

    #[test]
    fn future_timestamps_clamp_to_just_now() {
        let base = "2026-08-30T12:00:00";
        assert_eq!(rel_time(base, ms(base) - 60_000), "только что");
    }

    #[test]
    fn unparseable_input_is_empty() {
        assert_eq!(rel_time("", 0), "");
        assert_eq!(rel_time("вчера", 0), "");
    }

    #[test]
    fn mentions_are_split_out() {
        let parts = split_mentions("привет @alice и @bob-2!");
        assert_eq!(
            parts,
            vec![
                Fragment::Text("привет ".into()),
                Fragment::Mention("alice".into()),
                Fragment::Text(" и ".into()),
                Fragment::Mention("bob-2".into()),
                Fragment::Text("!".into()),
            ]
        );
    }

    #[test]
    fn text_without_mentions_is_one_fragment() {
        assert_eq!(
            split_mentions("просто текст"),
            vec![Fragment::Text("просто текст".into())]
        );
    }
}
