/// Global relays followed by record-specific ones. Blank entries are dropped; duplicates are
/// kept since publishing twice to one relay is harmless.
pub fn merge_relays<'a, I>(global: &'a [String], extra: I) -> Vec<String>
where
	I: IntoIterator<Item = &'a str>,
{
	global
		.iter()
		.map(String::as_str)
		.chain(extra)
		.map(str::trim)
		.filter(|relay| !relay.is_empty())
		.map(str::to_string)
		.collect()
}
