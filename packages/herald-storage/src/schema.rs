pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_events.sql")),
				"tables/002_room_info.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_room_info.sql")),
				"tables/003_scheduled_notes.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_scheduled_notes.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	#[test]
	fn includes_are_expanded() {
		let sql = super::render_schema();

		assert!(!sql.contains("\\ir "));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS events"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS room_info"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS scheduled_notes"));
	}
}
