//! Fuzzy text matching shared by every post store.

use crate::models::Post;

/// Returns true when every term of `query` matches some word of `text`.
///
/// A term matches a word when it is a case-insensitive substring of it, or,
/// for terms of four or more characters, when the two are within one edit.
/// A query with no terms matches everything.
pub fn fuzzy_matches(text: &str, query: &str) -> bool {
    let words: Vec<String> = tokenize(text).collect();
    tokenize(query).all(|term| {
        words
            .iter()
            .any(|word| word.contains(&term) || (term.chars().count() >= 4 && within_one_edit(word, &term)))
    })
}

/// Matches `query` against a post's title and content.
pub fn post_matches(post: &Post, query: &str) -> bool {
    fuzzy_matches(&format!("{} {}", post.title, post.content), query)
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.len() - short.len() > 1 {
        return false;
    }

    let mut i = 0;
    let mut j = 0;
    let mut edited = false;
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        if edited {
            return false;
        }
        edited = true;
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    true
}
