//! Free-text query sanitizer for the trigram full-text table
//!
//! The trigram table treats bare words as column names or operators. This
//! rewrites a user query into an expression where every term is a quoted
//! string, so only the operators the user clearly meant survive.
//!
//! # Examples
//!
//! ```
//! use archindex::query::sanitize;
//!
//! assert_eq!(sanitize("Akte Haushalt*"), r#""Akte" "Haushalt"*"#);
//! assert_eq!(sanitize("NS 19 Akten"), r#""NS 19 Akten""#);
//! assert_eq!(sanitize("Familie -Jugend"), r#""Familie" NOT "Jugend""#);
//! ```

/// Terms shorter than this cannot be matched by a trigram index on their own
const MIN_TERM_CHARS: usize = 3;

/// One unit of a tokenized query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrigramToken {
    Term {
        text: String,
        /// Written as a quoted phrase, or merged into one
        quoted: bool,
        /// Leading `-`
        negated: bool,
        /// Trailing `*`
        prefix: bool,
    },
    /// `AND`, `OR` or `NOT`, upper case only
    Operator(&'static str),
}

impl TrigramToken {
    fn is_short_bare(&self) -> bool {
        matches!(
            self,
            TrigramToken::Term { text, quoted: false, negated: false, prefix: false }
                if text.chars().count() < MIN_TERM_CHARS
        )
    }

    fn is_mergeable(&self) -> bool {
        matches!(self, TrigramToken::Term { quoted: false, negated: false, .. })
    }
}

/// Rewrite a free-text query into a safe match expression
pub fn sanitize(query: &str) -> String {
    let tokens = merge_short_terms(tokenize(query));

    let mut parts: Vec<String> = Vec::new();
    let mut pending_operator: Option<&'static str> = None;

    for token in tokens {
        match token {
            TrigramToken::Operator(op) => {
                // Only kept when a term precedes it; doubled operators keep the first
                if !parts.is_empty() && pending_operator.is_none() {
                    pending_operator = Some(op);
                }
            }
            TrigramToken::Term {
                text,
                negated,
                prefix,
                ..
            } => {
                let mut term = quote(&text);
                if prefix {
                    term.push('*');
                }
                if negated && !parts.is_empty() {
                    pending_operator = None;
                    parts.push("NOT".to_string());
                } else if let Some(op) = pending_operator.take() {
                    parts.push(op.to_string());
                }
                parts.push(term);
            }
        }
    }

    // A trailing operator is never emitted: it stays pending without a term after it
    parts.join(" ")
}

/// Split a query into quoted phrases, bare terms and operators
pub fn tokenize(query: &str) -> Vec<TrigramToken> {
    let chars: Vec<char> = query.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        // Negated phrase: -"..."
        let negated_phrase = chars[i] == '-' && i + 1 < len && chars[i + 1] == '"';
        if chars[i] == '"' || negated_phrase {
            if negated_phrase {
                i += 1;
            }
            i += 1; // opening quote
            let start = i;
            while i < len && chars[i] != '"' {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if i < len {
                i += 1; // closing quote
            }
            let mut prefix = false;
            while i < len && chars[i] == '*' {
                prefix = true;
                i += 1;
            }
            if !text.trim().is_empty() {
                tokens.push(TrigramToken::Term {
                    text,
                    quoted: true,
                    negated: negated_phrase,
                    prefix,
                });
            }
            continue;
        }

        let start = i;
        while i < len && !chars[i].is_whitespace() {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        if let Some(token) = classify(&word) {
            tokens.push(token);
        }
    }
    tokens
}

fn classify(word: &str) -> Option<TrigramToken> {
    match word {
        "AND" => return Some(TrigramToken::Operator("AND")),
        "OR" => return Some(TrigramToken::Operator("OR")),
        "NOT" => return Some(TrigramToken::Operator("NOT")),
        _ => {}
    }

    let (negated, rest) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let text = rest.trim_end_matches('*');
    let prefix = text.len() < rest.len();
    if text.is_empty() {
        return None;
    }
    Some(TrigramToken::Term {
        text: text.to_string(),
        quoted: false,
        negated,
        prefix,
    })
}

/// Join each short bare term with the bare term to its right into one phrase
///
/// Merging continues while the last absorbed term is itself short, so
/// `NS 19 Akten` becomes a single phrase.
fn merge_short_terms(tokens: Vec<TrigramToken>) -> Vec<TrigramToken> {
    let mut merged = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if !token.is_short_bare() {
            merged.push(token);
            continue;
        }
        let TrigramToken::Term { text, .. } = token else {
            continue;
        };

        let mut phrase = text;
        let mut prefix = false;
        let mut absorbed = false;
        while let Some(next) = iter.next_if(|t| t.is_mergeable()) {
            let continues = next.is_short_bare();
            if let TrigramToken::Term { text, prefix: p, .. } = next {
                phrase.push(' ');
                phrase.push_str(&text);
                prefix = p;
            }
            absorbed = true;
            if !continues {
                break;
            }
        }

        merged.push(TrigramToken::Term {
            text: phrase,
            quoted: absorbed,
            negated: false,
            prefix,
        });
    }
    merged
}

/// Double-quote a term, doubling embedded quotes
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}
