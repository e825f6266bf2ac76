//! Rolling tail of the progress log.

/// Return the last `max_lines` lines of `content`.
///
/// Line endings are normalized to `\n`. A trailing newline is kept when the
/// input ends with one.
pub fn tail_lines(content: &str, max_lines: usize) -> String {
    if max_lines == 0 {
        return String::new();
    }
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let mut tail = lines[start..].join("\n");
    if !tail.is_empty() && content.ends_with('\n') {
        tail.push('\n');
    }
    tail
}
