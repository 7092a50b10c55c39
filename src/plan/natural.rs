use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(u64),
    Text(String),
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Num(a), Token::Num(b)) => a.cmp(b),
            (Token::Num(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Num(_)) => Ordering::Greater,
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+|[^\d.\s_-]+").expect("regex for id tokens"))
}

fn tokens(id: &str) -> Vec<Token> {
    token_pattern()
        .find_iter(id)
        .map(|found| {
            let text = found.as_str();
            match text.parse::<u64>() {
                Ok(num) => Token::Num(num),
                Err(_) => Token::Text(text.to_lowercase()),
            }
        })
        .collect()
}

/// Compare dotted ids segment-wise so `6.4.c < 6.10` and `2 < 10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    tokens(a).cmp(&tokens(b)).then_with(|| a.cmp(b))
}

/// Leading dotted segment of an id (`"6.4.c"` -> `"6"`).
pub fn major_segment(id: &str) -> &str {
    id.split('.').next().unwrap_or(id).trim()
}
