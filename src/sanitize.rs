// ABOUTME: Strips characters that could break out of a pipeline-query string literal
// ABOUTME: Applied to watermark values before they are spliced into textual queries

/// Characters removed by [`sanitize`]: both quote styles and parentheses.
const STRIPPED: [char; 4] = ['\'', '"', '(', ')'];

/// Remove quote characters and parentheses from a watermark value.
///
/// Textual queries carry the watermark inside a single-quoted literal, so any
/// of these characters could end the literal early or change call nesting.
///
/// # Examples
///
/// ```
/// use highwater::sanitize;
/// assert_eq!(sanitize("my 'odd' value"), "my odd value");
/// assert_eq!(sanitize("my (odd) value"), "my odd value");
/// assert_eq!(sanitize("2024-01-01T00:00:00Z"), "2024-01-01T00:00:00Z");
/// ```
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| !STRIPPED.contains(c)).collect()
}
