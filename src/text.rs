//! Tokenization and vocabularies for descriptions and source code.

use crate::error::ReqVerError;
use std::collections::HashMap;
use std::path::Path;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_ID: i64 = 0;
pub const UNK_ID: i64 = 1;
/// Ids taken by [`PAD_TOKEN`] and [`UNK_TOKEN`].
pub const NUM_RESERVED: usize = 2;

/// Splits text into lowercase sub-tokens.
///
/// Non-alphanumeric characters separate tokens, and identifiers are further split
/// on camelCase, PascalCase and letter/digit boundaries, so that
/// `parseHTTPRequest_v2` becomes `["parse", "http", "request", "v", "2"]`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        split_identifier(word, &mut tokens);
    }
    tokens
}

fn split_identifier(word: &str, tokens: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut start = 0;
    for i in 1..chars.len() {
        let (prev, cur) = (chars[i - 1], chars[i]);
        let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
        let boundary = (prev.is_lowercase() && cur.is_uppercase())
            // "HTTPRequest": split before the last upper of an acronym
            || (prev.is_uppercase() && cur.is_uppercase() && next_is_lower)
            || (prev.is_alphabetic() && cur.is_numeric())
            || (prev.is_numeric() && cur.is_alphabetic());
        if boundary {
            tokens.push(chars[start..i].iter().collect::<String>().to_lowercase());
            start = i;
        }
    }
    tokens.push(chars[start..].iter().collect::<String>().to_lowercase());
}

/// Token ↔ id mapping.
///
/// Ids [`PAD_ID`] and [`UNK_ID`] are always reserved.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vocab {
    pub token_to_id: HashMap<String, i64>,
    pub id_to_token: Vec<String>,
}

impl Default for Vocab {
    fn default() -> Self {
        Self::from_tokens(std::iter::empty::<String>())
    }
}

impl Vocab {
    /// Creates a vocabulary from already-ordered tokens, after the reserved ones.
    ///
    /// Duplicates and reserved tokens in `tokens` are skipped.
    pub fn from_tokens<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Self {
        let mut vocab = Vocab {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
        };
        vocab.insert(PAD_TOKEN.to_string());
        vocab.insert(UNK_TOKEN.to_string());
        for token in tokens {
            vocab.insert(token.into());
        }
        vocab
    }

    fn insert(&mut self, token: String) {
        if self.token_to_id.contains_key(&token) {
            return;
        }
        self.token_to_id
            .insert(token.clone(), self.id_to_token.len() as i64);
        self.id_to_token.push(token);
    }

    /// Counts the tokens of every document and keeps the frequent ones.
    ///
    /// Tokens are ordered by descending count, then lexicographically. `max_size`
    /// includes the reserved tokens, which are always kept, so a `max_size` below
    /// [`NUM_RESERVED`] still yields them.
    pub fn build<'a, D>(documents: D, min_count: usize, max_size: usize) -> Self
    where
        D: IntoIterator<Item = &'a [String]>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doc in documents {
            for token in doc {
                *counts.entry(token.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|(token, count)| {
                *count >= min_count && *token != PAD_TOKEN && *token != UNK_TOKEN
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let budget = max_size.saturating_sub(NUM_RESERVED);
        Self::from_tokens(ranked.into_iter().take(budget).map(|(token, _)| token))
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// True when only the reserved tokens are present.
    pub fn has_no_tokens(&self) -> bool {
        self.len() <= NUM_RESERVED
    }

    pub fn id(&self, token: &str) -> i64 {
        self.token_to_id.get(token).copied().unwrap_or(UNK_ID)
    }

    pub fn token(&self, id: i64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.id_to_token.get(i))
            .map(String::as_str)
    }

    /// Maps tokens to ids, truncating or right-padding to exactly `max_len`.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S], max_len: usize) -> Vec<i64> {
        let mut ids: Vec<i64> = tokens
            .iter()
            .take(max_len)
            .map(|t| self.id(t.as_ref()))
            .collect();
        ids.resize(max_len, PAD_ID);
        ids
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReqVerError> {
        let path = path.as_ref();
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(|source| ReqVerError::Io {
            path: path.into(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReqVerError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ReqVerError::Io {
            path: path.into(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_identifiers() {
        assert_eq!(
            tokenize("parseHTTPRequest_v2(buf)"),
            vec!["parse", "http", "request", "v", "2", "buf"]
        );
        assert_eq!(tokenize("The user SHALL log in."), vec![
            "the", "user", "shall", "log", "in"
        ]);
        assert!(tokenize("  ;; ").is_empty());
    }

    #[test]
    fn build_orders_by_count_then_name() {
        let docs = [tokenize("b a c a b a"), tokenize("d")];
        let vocab = Vocab::build(docs.iter().map(Vec::as_slice), 1, 100);
        assert_eq!(vocab.id_to_token, vec![
            PAD_TOKEN, UNK_TOKEN, "a", "b", "c", "d"
        ]);

        let vocab = Vocab::build(docs.iter().map(Vec::as_slice), 2, 100);
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id("c"), UNK_ID);

        let vocab = Vocab::build(docs.iter().map(Vec::as_slice), 1, 3);
        assert_eq!(vocab.id_to_token, vec![PAD_TOKEN, UNK_TOKEN, "a"]);
    }

    #[test]
    fn tiny_max_size_keeps_only_reserved_tokens() {
        let docs = [tokenize("a b c")];
        for max_size in [0, 1, NUM_RESERVED] {
            let vocab = Vocab::build(docs.iter().map(Vec::as_slice), 1, max_size);
            assert_eq!(vocab.id_to_token, vec![PAD_TOKEN, UNK_TOKEN]);
            assert!(vocab.has_no_tokens());
            assert_eq!(vocab.id("a"), UNK_ID);
        }
        let vocab = Vocab::build(docs.iter().map(Vec::as_slice), 1, 100);
        assert!(!vocab.has_no_tokens());
    }

    #[test]
    fn encode_pads_and_truncates() {
        let vocab = Vocab::from_tokens(["open", "file"]);
        assert_eq!(vocab.encode(&["open", "socket"], 4), vec![2, UNK_ID, 0, 0]);
        assert_eq!(vocab.encode(&["file", "open", "file"], 2), vec![3, 2]);
        assert_eq!(vocab.token(3), Some("file"));
        assert_eq!(vocab.token(-1), None);
    }

    #[test]
    fn save_and_load() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = Vocab::from_tokens(["read", "write"]);
        vocab.save(&path).unwrap();
        assert_eq!(Vocab::load(&path).unwrap(), vocab);
    }
}
