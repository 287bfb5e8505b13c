//! Chart-lookup URLs and the color-tag scrubbing they require.
//!
//! The game's now-playing export wraps charter names in rich-text markup
//! (`<color=#FFDE2B>R</color>…`), which has no business appearing in URLs
//! or chat messages.

// {{{ Color tags
/// Remove `<color=…>` and `</color>` tags, keeping their inner text.
pub fn strip_color_tags(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	while let Some(open) = rest.find('<') {
		let tail = &rest[open + 1..];
		let tag_body = tail.strip_prefix('/').unwrap_or(tail);

		if tag_body.starts_with("color") {
			if let Some(close) = tail.find('>') {
				out.push_str(&rest[..open]);
				rest = &tail[close + 1..];
				continue;
			}
		}

		// A bare '<' that doesn't open a color tag stays as-is
		out.push_str(&rest[..open + 1]);
		rest = tail;
	}

	out.push_str(rest);
	out
}
// }}}
// {{{ URL builders
/// Placeholder values some clients send instead of omitting a field.
fn is_present(value: &str) -> bool {
	!value.is_empty() && value != "*No artist*" && value != "*Unknown*"
}

/// Search URL for the public chart index. The site's search is
/// case-normalized, so everything is lowercased before encoding.
pub fn enchor_url(title: &str, artist: &str, charter: &str) -> Option<String> {
	if !is_present(title) && !is_present(artist) {
		return None;
	}

	let mut params = Vec::new();
	if is_present(title) {
		params.push(format!(
			"name={}",
			urlencoding::encode(&title.to_lowercase())
		));
	}
	if is_present(artist) {
		params.push(format!(
			"artist={}",
			urlencoding::encode(&artist.to_lowercase())
		));
	}
	if is_present(charter) {
		let charter = strip_color_tags(charter);
		params.push(format!(
			"charter={}",
			urlencoding::encode(&charter.to_lowercase())
		));
	}

	Some(format!("https://www.enchor.us/?{}", params.join("&")))
}

/// Deep link into the local desktop app. Case-preserving: the app matches
/// exactly what the game exported.
pub fn bridge_url(title: &str, artist: &str, charter: &str) -> Option<String> {
	if !is_present(title) && !is_present(artist) {
		return None;
	}

	let mut params = Vec::new();
	if is_present(title) {
		params.push(format!("name={}", urlencoding::encode(title)));
	}
	if is_present(artist) {
		params.push(format!("artist={}", urlencoding::encode(artist)));
	}
	if is_present(charter) {
		let charter = strip_color_tags(charter);
		params.push(format!("charter={}", urlencoding::encode(&charter)));
	}

	Some(format!("chbridge://search?{}", params.join("&")))
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_color_tags() {
		assert_eq!(
			strip_color_tags("<color=#FFDE2B>R</color><color=#FFDE2B>L</color>"),
			"RL"
		);
		assert_eq!(strip_color_tags("plain name"), "plain name");
		assert_eq!(strip_color_tags("a < b and <b>bold</b>"), "a < b and <b>bold</b>");
		assert_eq!(strip_color_tags("<color=#123456>partial"), "partial");
	}

	#[test]
	fn web_url_is_lowercased_and_encoded() {
		let url = enchor_url("Through the Fire", "DragonForce", "Some Charter").unwrap();
		assert_eq!(
			url,
			"https://www.enchor.us/?name=through%20the%20fire&artist=dragonforce&charter=some%20charter"
		);
	}

	#[test]
	fn bridge_url_preserves_case() {
		let url = bridge_url("Afterglow", "Syncatto", "").unwrap();
		assert_eq!(url, "chbridge://search?name=Afterglow&artist=Syncatto");
	}

	#[test]
	fn requires_title_or_artist() {
		assert!(enchor_url("", "", "Charter").is_none());
		assert!(bridge_url("", "*No artist*", "").is_none());
		assert!(enchor_url("", "Artist Only", "").is_some());
	}

	#[test]
	fn charter_markup_is_scrubbed_before_encoding() {
		let url = enchor_url("Song", "", "<color=#FFDE2B>RL</color>").unwrap();
		assert!(url.ends_with("charter=rl"));
	}
}
// }}}
