//! Timestamp presentation. Storage is always UTC; only the formatting layer
//! knows about the configured display timezone.

// {{{ Imports
use chrono::{NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::{DateFormat, DisplaySettings, TimeFormat};
// }}}

// {{{ Timezone resolution
pub fn display_timezone(settings: &DisplaySettings) -> Tz {
	match settings.timezone.parse() {
		Ok(tz) => tz,
		Err(_) => {
			tracing::warn!(timezone = settings.timezone, "Unknown timezone, using UTC");
			Tz::UTC
		}
	}
}
// }}}
// {{{ Formatting
/// Render a stored UTC timestamp in the configured timezone, with its
/// abbreviation when the config asks for one.
pub fn format_timestamp(utc: NaiveDateTime, settings: &DisplaySettings) -> String {
	let tz = display_timezone(settings);
	let local = tz.from_utc_datetime(&utc);

	let date = match settings.date_format {
		DateFormat::MonthFirst => local.format("%m/%d/%Y"),
		DateFormat::DayFirst => local.format("%d/%m/%Y"),
		DateFormat::Iso => local.format("%Y-%m-%d"),
	};
	let time = match settings.time_format {
		TimeFormat::TwelveHour => local.format("%I:%M %p"),
		TimeFormat::TwentyFourHour => local.format("%H:%M"),
	};

	if settings.show_timezone_in_embeds {
		format!("{} {} {}", date, time, local.format("%Z"))
	} else {
		format!("{} {}", date, time)
	}
}

/// "N days" / "N hours" / "N minutes", whichever unit fits.
pub fn format_held_duration(duration: TimeDelta) -> String {
	let seconds = duration.num_seconds().max(0);

	let (amount, unit) = if seconds >= 86_400 {
		(seconds / 86_400, "day")
	} else if seconds >= 3_600 {
		(seconds / 3_600, "hour")
	} else {
		(seconds / 60, "minute")
	};

	if amount == 1 {
		format!("1 {unit}")
	} else {
		format!("{amount} {unit}s")
	}
}

#[inline]
pub fn now_utc() -> NaiveDateTime {
	Utc::now().naive_utc()
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	fn settings(timezone: &str) -> DisplaySettings {
		DisplaySettings {
			timezone: timezone.to_owned(),
			..DisplaySettings::default()
		}
	}

	fn naive(s: &str) -> NaiveDateTime {
		NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
	}

	#[test]
	fn formats_in_display_timezone() {
		let formatted = format_timestamp(naive("2024-06-01 12:00:00"), &settings("Europe/Vienna"));
		// CEST is UTC+2 in June
		assert_eq!(formatted, "06/01/2024 02:00 PM CEST");
	}

	#[test]
	fn unknown_timezone_falls_back_to_utc() {
		let formatted = format_timestamp(naive("2024-06-01 12:00:00"), &settings("Not/AZone"));
		assert_eq!(formatted, "06/01/2024 12:00 PM UTC");
	}

	#[test]
	fn respects_format_toggles() {
		let mut s = settings("UTC");
		s.date_format = DateFormat::Iso;
		s.time_format = TimeFormat::TwentyFourHour;
		s.show_timezone_in_embeds = false;

		let formatted = format_timestamp(naive("2024-06-01 09:05:00"), &s);
		assert_eq!(formatted, "2024-06-01 09:05");
	}

	#[test]
	fn held_duration_picks_the_right_unit() {
		assert_eq!(format_held_duration(TimeDelta::days(3)), "3 days");
		assert_eq!(format_held_duration(TimeDelta::days(1)), "1 day");
		assert_eq!(format_held_duration(TimeDelta::hours(5)), "5 hours");
		assert_eq!(format_held_duration(TimeDelta::minutes(42)), "42 minutes");
		assert_eq!(format_held_duration(TimeDelta::seconds(30)), "0 minutes");
	}
}
// }}}
