use serde_json::Value;
use std::collections::HashSet;

const HEURISTIC_MIN_RUN: usize = 3;
const HEURISTIC_MAX_RUN: usize = 25;
const HEURISTIC_MAX_LEN: usize = 29;
const HEURISTIC_MAX_ITEMS: usize = 15;

/// How a model reply was turned into candidate ingredient names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A JSON array was found and parsed.
    Strict(Vec<String>),
    /// No parseable array; names were scraped from the prose.
    Heuristic(Vec<String>),
    /// Neither pass produced anything.
    Failed(String),
}

/// Greedy slice from the first `[` to the last `]`, if both exist in that order.
pub fn extract_json_array(content: &str) -> Option<&str> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    (start < end).then(|| &content[start..=end])
}

/// Two-stage parse of a vision model reply.
///
/// Stage one looks for a JSON array embedded anywhere in the text; only string
/// elements are kept. Stage two runs when stage one finds no array or the array
/// is not valid JSON, and scrapes short alphabetic phrases line by line.
pub fn parse_ingredient_reply(content: &str) -> ParseResult {
    if let Some(slice) = extract_json_array(content) {
        match serde_json::from_str::<Value>(slice) {
            Ok(Value::Array(items)) => {
                return ParseResult::Strict(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::String(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                );
            }
            Ok(other) => {
                return ParseResult::Failed(format!("expected a JSON array, got {}", other));
            }
            Err(_) => {}
        }
    }

    let scraped = heuristic_names(content);
    if scraped.is_empty() {
        ParseResult::Failed("no ingredient-like text in reply".to_string())
    } else {
        ParseResult::Heuristic(scraped)
    }
}

/// Packs the words of a long run into groups of at most `HEURISTIC_MAX_RUN`
/// characters. A single word longer than that is dropped.
fn word_groups(run: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();

    for word in run.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > HEURISTIC_MAX_RUN {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            continue;
        }
        let current_len = current.chars().count();
        if !current.is_empty() && current_len + 1 + word_len > HEURISTIC_MAX_RUN {
            groups.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

/// Runs of letters and inner spaces, 3..=25 characters, lowercased, at most 15.
/// Longer runs are split into word groups that fit.
fn heuristic_names(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    'lines: for line in content.lines() {
        let fragments = line
            .split(|c: char| !(c.is_alphabetic() || c == ' '))
            .flat_map(|run| {
                let run = run.trim();
                if run.chars().count() > HEURISTIC_MAX_RUN {
                    word_groups(run)
                } else {
                    vec![run.to_string()]
                }
            });

        for run in fragments {
            let len = run.chars().count();
            if !(HEURISTIC_MIN_RUN..=HEURISTIC_MAX_RUN).contains(&len) {
                continue;
            }
            let name = run.to_lowercase();
            let len = name.chars().count();
            if len < HEURISTIC_MIN_RUN || len > HEURISTIC_MAX_LEN {
                continue;
            }
            if seen.insert(name.clone()) {
                out.push(name);
                if out.len() >= HEURISTIC_MAX_ITEMS {
                    break 'lines;
                }
            }
        }
    }

    out
}
