//! FTS5 query helpers

/// Turn free text into an FTS5 MATCH expression.
///
/// Every whitespace-separated term becomes a quoted prefix query and terms are implicitly
/// AND-ed, so user input never reaches the FTS5 query grammar unescaped. Returns `None` when
/// nothing searchable is left.
pub(crate) fn match_expression(input: &str) -> Option<String> {
    let terms: Vec<String> = input
        .split_whitespace()
        .map(|term| term.chars().filter(|c| *c != '"').collect::<String>())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
