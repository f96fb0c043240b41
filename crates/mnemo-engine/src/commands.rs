//! Memory-search commands a model can embed in its reply, e.g.
//! `**ltm_search**(trip to Kazan)`.

use std::sync::LazyLock;

use regex::Regex;

static LTM_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*ltm_search\*\*\(([^)]+)\)").expect("ltm_search pattern is valid")
});
static SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*search\*\*\(([^)]+)\)").expect("search pattern is valid"));
static NUMERIC_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[\s,]*\d*$").expect("numeric query pattern is valid"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchCommand {
    /// Argument of the command, trimmed, with quotes removed.
    pub query: String,
}

impl SearchCommand {
    /// Query to report for this command. Models sometimes answer with
    /// message numbers instead of a query; those are replaced by the last
    /// user message when there is one.
    pub fn resolve_query(&self, last_user: Option<&str>) -> String {
        match last_user {
            Some(user) if NUMERIC_QUERY.is_match(&self.query) => user.to_string(),
            _ => self.query.clone(),
        }
    }
}

/// First search command in `reply`. `**ltm_search**` takes precedence over
/// `**search**` wherever each appears.
pub fn parse_search_command(reply: &str) -> Option<SearchCommand> {
    let caps = LTM_SEARCH
        .captures(reply)
        .or_else(|| SEARCH.captures(reply))?;
    let query = caps
        .get(1)?
        .as_str()
        .trim()
        .replace(['\'', '"'], "");
    Some(SearchCommand { query })
}

/// Remove the first command of each form and trim the result.
pub fn strip_search_commands(reply: &str) -> String {
    let without_ltm = LTM_SEARCH.replace(reply, "");
    SEARCH.replace(&without_ltm, "").trim().to_string()
}
