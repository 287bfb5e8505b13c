//! Configuration-driven projection of a classified submission into a
//! structured announcement.
//!
//! This is a pure function: classification + score + metadata + config +
//! clock in, [`Announcement`] out. Field inclusion comes from the typed
//! palettes in [`crate::config`], enumerated in one fixed order, so the
//! same inputs always produce byte-identical output. The chat transport
//! only ever sees the finished document (or its embed projection).

// {{{ Imports
use chrono::NaiveDateTime;
use poise::serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter};

use crate::backfill::RetroFc;
use crate::config::{
	AccuracyDisplay, AccuracyFormat, AnnouncementStyle, Config, FieldPalette, HashFormat,
};
use crate::links;
use crate::submission::{Category, Classification, ScoreSubmission};
use crate::time::{format_held_duration, format_timestamp};
// }}}

// {{{ Announcement document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
	pub name: String,
	pub value: String,
	pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
	pub title: String,
	pub description: String,
	pub accent_color: u32,
	pub fields: Vec<EmbedField>,
	pub footer: Option<String>,
	/// External chat id of a user the transport should ping, if any.
	pub ping_external_id: Option<String>,
}

impl Announcement {
	pub fn to_embed(&self) -> CreateEmbed {
		let mut embed = CreateEmbed::default()
			.title(&self.title)
			.description(&self.description)
			.colour(Colour::new(self.accent_color));

		for field in &self.fields {
			embed = embed.field(&field.name, &field.value, field.inline);
		}

		if let Some(footer) = &self.footer {
			embed = embed.footer(CreateEmbedFooter::new(footer));
		}

		embed
	}
}
// }}}
// {{{ Small helpers
fn parse_color(hex: &str, fallback: u32) -> u32 {
	let stripped = hex.strip_prefix('#').unwrap_or(hex);
	if stripped.len() != 6 {
		tracing::warn!(hex, "Invalid embed color, using default");
		return fallback;
	}

	u32::from_str_radix(stripped, 16).unwrap_or_else(|_| {
		tracing::warn!(hex, "Invalid embed color, using default");
		fallback
	})
}

/// 147392 -> "147,392"
pub fn format_points(points: u32) -> String {
	let digits = points.to_string();
	let mut out = String::with_capacity(digits.len() + digits.len() / 3);

	for (i, char) in digits.chars().enumerate() {
		if i > 0 && (digits.len() - i) % 3 == 0 {
			out.push(',');
		}
		out.push(char);
	}

	out
}

fn stars_display(stars: u8) -> String {
	if stars == 0 {
		"-".to_owned()
	} else {
		"⭐".repeat(stars as usize)
	}
}

fn accuracy_values(
	submission: &ScoreSubmission,
	display: &AccuracyDisplay,
) -> (Option<String>, Option<String>) {
	let percent = format!("{:.1}%", submission.completion_percent);
	let notes = submission
		.notes_hit
		.zip(submission.notes_total)
		.map(|(hit, total)| {
			if display.show_notes_label {
				format!("{hit}/{total} notes")
			} else {
				format!("{hit}/{total}")
			}
		});

	match (display.format, notes) {
		(AccuracyFormat::PercentageOnly, _) | (_, None) => (Some(percent), None),
		(AccuracyFormat::NotesOnly, Some(notes)) => (Some(notes), None),
		(AccuracyFormat::CombinedPercentageFirst, Some(notes)) => {
			(Some(format!("{percent} ({notes})")), None)
		}
		(AccuracyFormat::CombinedNotesFirst, Some(notes)) => {
			(Some(format!("{notes} ({percent})")), None)
		}
		(AccuracyFormat::SeparateFields, Some(notes)) => (Some(percent), Some(notes)),
	}
}
// }}}
// {{{ Builder
/// Walks the palette in the §config field order, appending only what's
/// toggled on.
struct AnnouncementBuilder<'a> {
	palette: &'a FieldPalette,
	fields: Vec<EmbedField>,
}

impl<'a> AnnouncementBuilder<'a> {
	fn new(palette: &'a FieldPalette) -> Self {
		Self {
			palette,
			fields: Vec::new(),
		}
	}

	fn field(&mut self, name: &str, value: String, inline: bool) {
		self.fields.push(EmbedField {
			name: name.to_owned(),
			value,
			inline,
		});
	}

	fn instrument_difficulty(&mut self, submission: &ScoreSubmission) {
		if self.palette.difficulty_instrument {
			self.field("Instrument", submission.instrument.to_string(), true);
			self.field("Difficulty", submission.difficulty.to_string(), true);
		}
	}

	fn stars(&mut self, submission: &ScoreSubmission) {
		if self.palette.stars {
			self.field("Stars", stars_display(submission.stars), true);
		}
	}

	fn charter(&mut self, submission: &ScoreSubmission) {
		if self.palette.charter && !submission.song.charter.is_empty() {
			self.field(
				"Charter",
				links::strip_color_tags(&submission.song.charter),
				true,
			);
		}
	}

	fn accuracy(&mut self, submission: &ScoreSubmission, display: &AccuracyDisplay) {
		if !self.palette.accuracy {
			return;
		}

		let (accuracy, notes) = accuracy_values(submission, display);
		if let Some(accuracy) = accuracy {
			self.field("Accuracy", accuracy, true);
		}
		if let Some(notes) = notes {
			self.field("Notes", notes, true);
		}
	}

	fn play_count(&mut self, submission: &ScoreSubmission) {
		if self.palette.play_count {
			if let Some(count) = submission.play_count {
				self.field("Play Count", count.to_string(), true);
			}
		}
	}

	fn best_streak(&mut self, submission: &ScoreSubmission) {
		if self.palette.best_streak {
			if let Some(streak) = submission.best_streak {
				self.field("Best Streak", streak.to_string(), true);
			}
		}
	}

	fn links(&mut self, submission: &ScoreSubmission) {
		if !self.palette.enchor_link {
			return;
		}

		let title = &submission.song.title;
		let artist = &submission.song.artist;
		let charter = &submission.song.charter;

		let mut lines = Vec::new();
		if let Some(url) = links::enchor_url(title, artist, charter) {
			lines.push(format!("[Search on enchor.us]({url})"));
		}
		if let Some(url) = links::bridge_url(title, artist, charter) {
			lines.push(format!("[Open in Bridge]({url})"));
		}

		if !lines.is_empty() {
			self.field("Find This Chart", lines.join("\n"), false);
		}
	}

	fn chart_hash(&mut self, submission: &ScoreSubmission) {
		if self.palette.chart_hash {
			let hash = match self.palette.chart_hash_format {
				HashFormat::Abbreviated => submission.chart.short_hex(),
				HashFormat::Full => submission.chart.to_hex(),
			};
			self.field("Chart Hash", format!("`{hash}`"), false);
		}
	}

	fn timestamp(&mut self, now: NaiveDateTime, config: &Config) {
		if self.palette.timestamp {
			self.field("Achieved", format_timestamp(now, &config.display), true);
		}
	}
}
// }}}
// {{{ Category rendering
struct CategoryLook {
	title: &'static str,
	action: &'static str,
	fallback_color: u32,
}

fn category_look(category: Category) -> CategoryLook {
	match category {
		Category::RecordBreak => CategoryLook {
			title: "🏆 NEW RECORD SET!",
			action: "set a new server record!",
			fallback_color: 0xFFD700,
		},
		Category::FirstTime => CategoryLook {
			title: "🎸 FIRST SCORE ON CHART!",
			action: "was the first to score on this chart!",
			fallback_color: 0x4169E1,
		},
		Category::PersonalBest => CategoryLook {
			title: "📈 PERSONAL BEST!",
			action: "improved their personal best!",
			fallback_color: 0x32CD32,
		},
		Category::None => CategoryLook {
			title: "NEW HIGH SCORE!",
			action: "set a new score!",
			fallback_color: 0xFFD700,
		},
	}
}

fn chart_display(submission: &ScoreSubmission) -> String {
	let title = &submission.song.title;
	if title.is_empty() || title.starts_with('[') {
		format!("[{}]", submission.chart.short_hex())
	} else if submission.song.artist.is_empty() {
		title.clone()
	} else {
		format!("{} - {}", title, submission.song.artist)
	}
}

fn description(
	palette: &FieldPalette,
	look: &CategoryLook,
	submission: &ScoreSubmission,
	classification: &Classification,
	show_improvement: bool,
) -> String {
	let mut description = format!("<@{}> {}\n", classification.external_id, look.action);

	if palette.song_title {
		description.push_str(&format!("\n**Song:** *{}*", chart_display(submission)));
	}
	if palette.score {
		description.push_str(&format!(
			"\n**Score:** *{}* points",
			format_points(submission.score)
		));

		if show_improvement && palette.improvement {
			if let Some(previous) = classification.user_previous_score {
				if submission.score > previous {
					description.push_str(&format!(" (+{})", format_points(submission.score - previous)));
				}
			}
		}
	}

	description
}

/// Should this personal best be announced at all?
fn personal_best_passes_thresholds(
	submission: &ScoreSubmission,
	classification: &Classification,
	config: &Config,
) -> bool {
	let settings = &config.announcements.personal_bests;
	let Some(previous) = classification.user_previous_score.filter(|p| *p > 0) else {
		return false;
	};

	let points_gain = submission.score.saturating_sub(previous);
	let percent_gain = points_gain as f64 / previous as f64 * 100.0;

	let points_ok = points_gain >= settings.min_improvement_points;
	let percent_ok = percent_gain >= settings.min_improvement_percent;

	match settings.threshold_mode {
		crate::config::ThresholdMode::Both => points_ok && percent_ok,
		crate::config::ThresholdMode::Either => points_ok || percent_ok,
	}
}
// }}}
// {{{ Render
/// Project a classified submission into an announcement, or `None` when the
/// configuration says this event isn't worth announcing.
///
/// `now` is passed in instead of read from the clock so rendering is
/// deterministic.
pub fn render(
	submission: &ScoreSubmission,
	classification: &Classification,
	config: &Config,
	now: NaiveDateTime,
) -> Option<Announcement> {
	let announcements = &config.announcements;

	// {{{ Category gating
	let (enabled, color_hex, style, full, minimalist, accuracy) = match classification.category {
		Category::RecordBreak => {
			let s = &announcements.record_breaks;
			if submission.score < s.min_score_threshold {
				return None;
			}
			(
				s.enabled,
				&s.embed_color,
				s.style,
				&s.full_fields,
				&s.minimalist_fields,
				&announcements.accuracy_display.record_breaks,
			)
		}
		Category::FirstTime => {
			let s = &announcements.first_time_scores;
			(
				s.enabled,
				&s.embed_color,
				s.style,
				&s.full_fields,
				&s.minimalist_fields,
				&announcements.accuracy_display.first_time_scores,
			)
		}
		Category::PersonalBest => {
			if !personal_best_passes_thresholds(submission, classification, config) {
				return None;
			}
			let s = &announcements.personal_bests;
			(
				s.enabled,
				&s.embed_color,
				s.style,
				&s.full_fields,
				&s.minimalist_fields,
				&announcements.accuracy_display.personal_bests,
			)
		}
		Category::None => return render_standalone_fc(submission, classification, config, now),
	};

	if !enabled {
		return None;
	}
	// }}}

	let look = category_look(classification.category);
	let palette = match style {
		AnnouncementStyle::Full => full,
		AnnouncementStyle::Minimalist => minimalist,
	};

	let show_improvement = matches!(
		classification.category,
		Category::RecordBreak | Category::PersonalBest
	);

	// {{{ Fields, in palette order
	let mut builder = AnnouncementBuilder::new(palette);
	builder.instrument_difficulty(submission);
	builder.stars(submission);
	builder.charter(submission);
	builder.accuracy(submission, accuracy);
	builder.play_count(submission);
	builder.best_streak(submission);

	if classification.category == Category::RecordBreak && palette.previous_record {
		if let Some(record) = &classification.standing_record {
			builder.field(
				"Previous Record",
				format!("{}: {} pts", record.holder_name, format_points(record.score)),
				false,
			);
		}
	}

	if classification.category == Category::PersonalBest {
		if palette.previous_best {
			if let Some(previous) = classification.user_previous_score {
				builder.field("Previous Best", format!("{} pts", format_points(previous)), true);
			}
		}
		if palette.server_record_holder {
			if let Some(record) = &classification.standing_record {
				builder.field(
					"Server Record",
					format!("{}: {} pts", record.holder_name, format_points(record.score)),
					true,
				);
			}
		}
	}

	builder.links(submission);
	builder.chart_hash(submission);
	builder.timestamp(now, config);
	// }}}
	// {{{ Record-break footer
	let footer = if classification.category == Category::RecordBreak {
		classification.standing_record.as_ref().and_then(|record| {
			let mut parts = Vec::new();

			match (
				palette.footer_show_previous_holder,
				palette.footer_show_previous_score,
			) {
				(true, true) => parts.push(format!(
					"Previous record: {} ({} pts)",
					record.holder_name,
					format_points(record.score)
				)),
				(true, false) => {
					parts.push(format!("Previous record: {}", record.holder_name))
				}
				(false, true) => parts.push(format!(
					"Previous record: {} pts",
					format_points(record.score)
				)),
				(false, false) => {}
			}

			if palette.footer_show_held_duration {
				let held = now - record.submitted_at;
				parts.push(format!("Held for {}", format_held_duration(held)));
			}

			if palette.footer_show_set_timestamp {
				parts.push(format!(
					"Set on {}",
					format_timestamp(record.submitted_at, &config.display)
				));
			}

			if parts.is_empty() {
				None
			} else {
				Some(parts.join(" • "))
			}
		})
	} else {
		None
	};
	// }}}

	let ping_external_id = (classification.category == Category::RecordBreak
		&& announcements.record_breaks.ping_previous_holder)
		.then(|| {
			classification
				.standing_record
				.as_ref()
				.filter(|record| record.holder_external_id != classification.external_id)
				.map(|record| record.holder_external_id.clone())
		})
		.flatten();

	Some(Announcement {
		title: look.title.to_owned(),
		description: description(palette, &look, submission, classification, show_improvement),
		accent_color: parse_color(color_hex, look.fallback_color),
		fields: builder.fields,
		footer,
		ping_external_id,
	})
}
// }}}
// {{{ Standalone full combos
/// A full combo that broke no records still deserves a shout when the
/// config says so.
fn render_standalone_fc(
	submission: &ScoreSubmission,
	classification: &Classification,
	config: &Config,
	now: NaiveDateTime,
) -> Option<Announcement> {
	let settings = &config.announcements.full_combos;
	if !classification.is_full_combo || !settings.enabled {
		return None;
	}

	let announce = if classification.is_first_fc {
		settings.announce_first_fc
	} else {
		settings.announce_regular_fc
	};
	if !announce {
		return None;
	}

	let palette = match settings.style {
		AnnouncementStyle::Full => &settings.full_fields,
		AnnouncementStyle::Minimalist => &settings.minimalist_fields,
	};

	let (title, action) = if classification.is_first_fc {
		("🥇 FIRST FULL COMBO!", "got the first full combo on this chart!")
	} else {
		("💯 FULL COMBO!", "full comboed the chart!")
	};

	let mut description = format!("<@{}> {}\n", classification.external_id, action);
	if palette.song_title {
		description.push_str(&format!("\n**Song:** *{}*", chart_display(submission)));
	}
	if palette.score {
		description.push_str(&format!(
			"\n**Score:** *{}* points",
			format_points(submission.score)
		));
	}

	let mut builder = AnnouncementBuilder::new(palette);
	builder.instrument_difficulty(submission);
	builder.stars(submission);
	builder.charter(submission);
	builder.accuracy(submission, &config.announcements.accuracy_display.full_combos);
	builder.play_count(submission);
	builder.links(submission);
	builder.chart_hash(submission);
	builder.timestamp(now, config);

	Some(Announcement {
		title: title.to_owned(),
		description,
		accent_color: parse_color(&settings.embed_color, 0xFF4500),
		fields: builder.fields,
		footer: None,
		ping_external_id: None,
	})
}

/// Announcement for a retroactively detected FC (the backfill's output).
pub fn render_retro_fc(event: &RetroFc, config: &Config, now: NaiveDateTime) -> Option<Announcement> {
	let settings = &config.announcements.full_combos;
	if !settings.enabled || !settings.announce_retroactive_fcs {
		return None;
	}
	if event.is_fc_record_break && !settings.announce_fc_record_break {
		return None;
	}

	let title = if event.is_first_fc {
		"🥇 RETROACTIVE FIRST FULL COMBO!"
	} else {
		"💯 RETROACTIVE FULL COMBO!"
	};

	let mut description = format!(
		"<@{}> full comboed this chart back on {}!",
		event.external_id,
		format_timestamp(event.submitted_at, &config.display)
	);
	description.push_str(&format!(
		"\n\n**Song:** *{}*\n**Score:** *{}* points",
		event.song_title,
		format_points(event.score)
	));

	let mut fields = vec![
		EmbedField {
			name: "Instrument".to_owned(),
			value: event.instrument.to_string(),
			inline: true,
		},
		EmbedField {
			name: "Difficulty".to_owned(),
			value: event.difficulty.to_string(),
			inline: true,
		},
	];

	if let (Some(holder), Some(score)) = (&event.previous_holder, event.previous_score) {
		if event.is_fc_record_break {
			fields.push(EmbedField {
				name: "Beat".to_owned(),
				value: format!("{}: {} pts", holder, format_points(score)),
				inline: true,
			});
		}
	}

	fields.push(EmbedField {
		name: "Chart Hash".to_owned(),
		value: format!("`{}`", event.chart.short_hex()),
		inline: false,
	});
	fields.push(EmbedField {
		name: "Detected".to_owned(),
		value: format_timestamp(now, &config.display),
		inline: true,
	});

	Some(Announcement {
		title: title.to_owned(),
		description,
		accent_color: parse_color(&settings.embed_color, 0xFF4500),
		fields,
		footer: None,
		ping_external_id: None,
	})
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use chrono::NaiveDateTime;

	use super::*;
	use crate::clonehero::{ChartId, Difficulty, Instrument};
	use crate::songs::SongInfo;
	use crate::submission::StandingRecord;

	// {{{ Fixtures
	fn naive(s: &str) -> NaiveDateTime {
		NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
	}

	fn submission() -> ScoreSubmission {
		ScoreSubmission {
			chart: ChartId([0xab; 16]),
			instrument: Instrument::Lead,
			difficulty: Difficulty::Expert,
			score: 150_000,
			completion_percent: 97.5,
			stars: 5,
			song: SongInfo {
				title: "Soulless 5".into(),
				artist: "ExileLord".into(),
				charter: "<color=#FFDE2B>GHS</color>".into(),
			},
			notes_hit: Some(440),
			notes_total: Some(450),
			play_count: Some(12),
			..ScoreSubmission::default()
		}
	}

	fn record_break() -> Classification {
		Classification {
			user_id: 1,
			username: "U1".into(),
			external_id: "1001".into(),
			category: Category::RecordBreak,
			is_high_score: true,
			is_full_combo: false,
			is_first_fc: false,
			is_fc_record_break: false,
			standing_record: Some(StandingRecord {
				holder_id: 2,
				holder_name: "U2".into(),
				holder_external_id: "1002".into(),
				score: 100_000,
				submitted_at: naive("2024-05-29 12:00:00"),
			}),
			user_previous_score: Some(90_000),
			your_best_score: 150_000,
		}
	}
	// }}}

	#[test]
	fn record_break_has_footer_with_held_duration() {
		let config = Config::default();
		let announcement = render(
			&submission(),
			&record_break(),
			&config,
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();

		assert_eq!(announcement.title, "🏆 NEW RECORD SET!");
		assert_eq!(announcement.accent_color, 0xFFD700);

		let footer = announcement.footer.unwrap();
		assert!(footer.contains("Previous record: U2 (100,000 pts)"));
		assert!(footer.contains("Held for 3 days"));
		assert!(footer.contains(" • "));

		// Improvement over the user's own previous score
		assert!(announcement.description.contains("(+50,000)"));
		// Previous holder gets pinged
		assert_eq!(announcement.ping_external_id.as_deref(), Some("1002"));
	}

	#[test]
	fn rendering_is_deterministic() {
		let config = Config::default();
		let now = naive("2024-06-01 12:00:00");

		let a = render(&submission(), &record_break(), &config, now).unwrap();
		let b = render(&submission(), &record_break(), &config, now).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn field_order_is_fixed() {
		let config = Config::default();
		let announcement = render(
			&submission(),
			&record_break(),
			&config,
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();

		let names: Vec<&str> = announcement
			.fields
			.iter()
			.map(|field| field.name.as_str())
			.collect();
		assert_eq!(
			names,
			vec![
				"Instrument",
				"Difficulty",
				"Stars",
				"Charter",
				"Accuracy",
				"Play Count",
				"Previous Record",
				"Find This Chart",
				"Chart Hash",
				"Achieved",
			]
		);

		// Color markup never leaks into the document
		let charter = &announcement.fields[3];
		assert_eq!(charter.value, "GHS");
	}

	#[test]
	fn minimalist_palette_trims_fields() {
		let mut config = Config::default();
		config.announcements.record_breaks.style = AnnouncementStyle::Minimalist;

		let announcement = render(
			&submission(),
			&record_break(),
			&config,
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();

		let names: Vec<&str> = announcement
			.fields
			.iter()
			.map(|field| field.name.as_str())
			.collect();
		assert!(!names.contains(&"Charter"));
		assert!(!names.contains(&"Find This Chart"));

		// Abbreviated hash in minimalist mode
		let hash = announcement
			.fields
			.iter()
			.find(|field| field.name == "Chart Hash")
			.unwrap();
		assert_eq!(hash.value, "`abababab`");
	}

	#[test]
	fn personal_best_respects_both_thresholds() {
		let mut config = Config::default();
		config.announcements.personal_bests.enabled = true;

		let mut classification = record_break();
		classification.category = Category::PersonalBest;
		classification.user_previous_score = Some(145_000);

		// +5,000 points is ~3.4%: below the 5% default threshold
		assert!(render(
			&submission(),
			&classification,
			&config,
			naive("2024-06-01 12:00:00")
		)
		.is_none());

		// +50,000 over 100,000 passes both thresholds
		classification.user_previous_score = Some(100_000);
		let announcement = render(
			&submission(),
			&classification,
			&config,
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();
		assert_eq!(announcement.title, "📈 PERSONAL BEST!");
		assert!(announcement.footer.is_none());
	}

	#[test]
	fn separate_accuracy_fields_mode() {
		let mut config = Config::default();
		config
			.announcements
			.accuracy_display
			.record_breaks
			.format = AccuracyFormat::SeparateFields;

		let announcement = render(
			&submission(),
			&record_break(),
			&config,
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();

		let names: Vec<&str> = announcement
			.fields
			.iter()
			.map(|field| field.name.as_str())
			.collect();
		assert!(names.contains(&"Accuracy"));
		assert!(names.contains(&"Notes"));
	}

	#[test]
	fn disabled_category_renders_nothing() {
		let mut config = Config::default();
		config.announcements.record_breaks.enabled = false;

		assert!(render(
			&submission(),
			&record_break(),
			&config,
			naive("2024-06-01 12:00:00")
		)
		.is_none());
	}

	#[test]
	fn raw_scores_fall_back_to_short_hash() {
		let mut sub = submission();
		sub.song = SongInfo::default();

		let announcement = render(
			&sub,
			&record_break(),
			&Config::default(),
			naive("2024-06-01 12:00:00"),
		)
		.unwrap();
		assert!(announcement.description.contains("[abababab]"));
	}

	#[test]
	fn points_formatting() {
		assert_eq!(format_points(0), "0");
		assert_eq!(format_points(999), "999");
		assert_eq!(format_points(1_000), "1,000");
		assert_eq!(format_points(147_392), "147,392");
		assert_eq!(format_points(1_234_567), "1,234,567");
	}
}
// }}}
