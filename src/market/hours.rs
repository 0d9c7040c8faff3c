use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};

const OPEN_MINUTE: u32 = 9 * 60 + 30;
const CLOSE_MINUTE: u32 = 16 * 60;

/// Whether `now` falls inside the NYSE regular session
/// (09:30–16:00 Eastern, Monday–Friday).
///
/// Holidays are not modeled; alerts restricted to market hours simply stay
/// quiet on a closed weekday session because no trades print.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let offset_hours = if is_us_dst(now) { -4 } else { -5 };
    let eastern = now + Duration::hours(offset_hours);

    if matches!(eastern.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minute_of_day = eastern.hour() * 60 + eastern.minute();
    (OPEN_MINUTE..CLOSE_MINUTE).contains(&minute_of_day)
}

/// US daylight saving: second Sunday of March through first Sunday of
/// November. The civil date is derived from Eastern standard time, so the
/// rule is exact except within the 02:00 transition hour itself.
fn is_us_dst(now: DateTime<Utc>) -> bool {
    let date = (now - Duration::hours(5)).date_naive();
    let dst_start = nth_weekday(date.year(), 3, Weekday::Sun, 2);
    let dst_end = nth_weekday(date.year(), 11, Weekday::Sun, 1);
    date >= dst_start && date < dst_end
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is a valid date");
    let days_ahead = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday())
        % 7
        + 7 * (nth - 1);
    first + Duration::days(days_ahead as i64)
}
