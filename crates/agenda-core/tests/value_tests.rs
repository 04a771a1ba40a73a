use chrono::{Duration, NaiveDate, TimeZone, Utc};

use agenda_core::value::{parse_date_list, parse_date_value, parse_duration, unescape_text, ValueError};
use agenda_core::DateValue;

#[test]
fn durations() {
    assert_eq!(parse_duration("PT1H30M"), Ok(Duration::minutes(90)));
    assert_eq!(parse_duration("P1D"), Ok(Duration::days(1)));
    assert_eq!(parse_duration("P2W"), Ok(Duration::weeks(2)));
    assert_eq!(parse_duration("-PT15M"), Ok(Duration::minutes(-15)));
    assert_eq!(parse_duration("+P1DT2H"), Ok(Duration::hours(26)));
    assert_eq!(parse_duration("PT0S"), Ok(Duration::zero()));
}

#[test]
fn malformed_durations() {
    for raw in ["", "P", "PT", "1H", "PT1D", "P1H", "PTH", "P1D2"] {
        assert_eq!(
            parse_duration(raw),
            Err(ValueError::Duration(raw.to_string())),
            "{:?} should be rejected",
            raw
        );
    }
}

#[test]
fn date_value_forms() {
    let at = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();

    assert_eq!(
        parse_date_value("20240301T090000Z", None, false),
        Ok(DateValue::Utc(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    );
    // A trailing Z wins over TZID.
    assert_eq!(
        parse_date_value("20240301T090000Z", Some("Europe/Berlin"), false),
        Ok(DateValue::Utc(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    );
    assert_eq!(
        parse_date_value("20240301T090000", Some("Europe/Berlin"), false),
        Ok(DateValue::Zoned {
            tzid: "Europe/Berlin".to_string(),
            local: at
        })
    );
    assert_eq!(
        parse_date_value("20240301T090000", None, false),
        Ok(DateValue::Floating(at))
    );
    assert_eq!(
        parse_date_value("20240301", None, false),
        Ok(DateValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
    );
    assert!(matches!(
        parse_date_value("20240301T090000", None, true),
        Err(ValueError::Date(_))
    ));
    assert!(matches!(
        parse_date_value("20241301T090000Z", None, false),
        Err(ValueError::DateTime(_))
    ));
}

#[test]
fn date_lists_and_periods() {
    let list = parse_date_list("20240301T090000Z, 20240302T090000Z/PT1H,", None, false).unwrap();
    assert_eq!(
        list,
        vec![
            DateValue::Utc(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            DateValue::Utc(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap()),
        ]
    );
    assert!(parse_date_list("20240301T090000Z,garbage", None, false).is_err());
}

#[test]
fn text_unescaping() {
    assert_eq!(unescape_text(r"a\,b\;c\\d\ne\N"), "a,b;c\\d\ne\n");
    assert_eq!(unescape_text("trailing\\"), "trailing\\");
    assert_eq!(unescape_text("plain"), "plain");
}
