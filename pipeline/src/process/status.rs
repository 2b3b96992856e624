/// Extract the message from a renderer status line of the form
/// `progress{text}`. Any other output is not a status line.
pub fn parse_status_line(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("progress{")?
        .strip_suffix('}')
        .map(str::trim)
}
