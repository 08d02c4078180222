//! Localized-message rendering for the favorites surfaces. A small English
//! catalog with `$1`-style substitution; unknown keys render in the
//! `⧼key⧽` placeholder form so a missing message is visible, not fatal.

const CATALOG: &[(&str, &str)] = &[
    (
        "addedfavoritetext",
        "The page \"$1\" has been added to your favorites.",
    ),
    (
        "removedfavoritetext",
        "The page \"$1\" has been removed from your favorites.",
    ),
    (
        "favoriteerrortext",
        "A problem occurred while updating favorites for the page \"$1\".",
    ),
    (
        "notloggedin-favorites",
        "You must be logged in to have a favorites list.",
    ),
];

/// Render a message key with positional `$1`, `$2`, ... arguments.
pub fn render(key: &str, args: &[&str]) -> String {
    let Some((_, template)) = CATALOG.iter().find(|(name, _)| *name == key) else {
        return format!("\u{29fc}{key}\u{29fd}");
    };
    let mut rendered = (*template).to_string();
    for (index, arg) in args.iter().enumerate() {
        rendered = rendered.replace(&format!("${}", index + 1), arg);
    }
    rendered
}

/// Wrap rendered message text as block-level markup, the form the API
/// returns in its `message` field.
pub fn parse_as_block(text: &str) -> String {
    format!("<p>{text}\n</p>")
}
