//! Error details persisted next to a failed status.

use std::borrow::Cow;

const MAX_DETAIL_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";
const NSEC_PREFIX: &str = "nsec1";
const SECRET_FIELDS: &[&str] =
	&["nsec", "secret", "secret_key", "password", "token", "api_key", "apikey", "authorization"];

/// Collapses whitespace, hides signing keys and credentials, and caps the text.
///
/// Anything from an `nsec1` prefix onward is replaced, as is the value of a `field=value` or
/// `field:value` pair whose field names a secret (`room_nsec=...`, `secret_key:...`) and the word
/// after `Bearer`.
pub fn sanitize_detail(text: &str) -> String {
	let mut previous = None::<&str>;
	let words = text
		.split_whitespace()
		.map(|word| {
			let redacted = redact(word, previous);

			previous = Some(word);

			redacted
		})
		.collect::<Vec<_>>();

	cap(words.join(" "))
}

fn redact<'a>(word: &'a str, previous: Option<&str>) -> Cow<'a, str> {
	if previous.is_some_and(|previous| previous.eq_ignore_ascii_case("bearer")) {
		return Cow::Borrowed(REDACTED);
	}
	// ASCII lowercasing keeps byte offsets valid for `word`.
	if let Some(at) = word.to_ascii_lowercase().find(NSEC_PREFIX) {
		return Cow::Owned(format!("{}{REDACTED}", &word[..at]));
	}
	if let Some((field, _)) = word.split_once(['=', ':'])
		&& is_secret_field(field)
	{
		let separator = word.as_bytes()[field.len()] as char;

		return Cow::Owned(format!("{field}{separator}{REDACTED}"));
	}

	Cow::Borrowed(word)
}

fn is_secret_field(field: &str) -> bool {
	let field = field
		.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
		.to_ascii_lowercase();

	SECRET_FIELDS.iter().any(|secret| field.ends_with(secret))
}

fn cap(mut text: String) -> String {
	if text.chars().count() > MAX_DETAIL_CHARS {
		text = text.chars().take(MAX_DETAIL_CHARS).collect();
		text.push_str("...");
	}

	text
}
