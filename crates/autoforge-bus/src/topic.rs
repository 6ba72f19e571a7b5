//! Topic pattern matching for exchange bindings.
//!
//! Patterns are dot-separated words where `*` matches exactly one word and
//! `#` matches zero or more words, mirroring AMQP topic exchanges.

/// Returns `true` when `routing_key` matches the binding `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern_words: Vec<&str> = pattern.split('.').collect();
    let key_words: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern_words, &key_words)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // `#` consumes zero words, or one word and stays greedy.
            matches_words(rest, key)
                || (!key.is_empty() && matches_words(pattern, &key[1..]))
        }
        Some((&"*", rest)) => match key.split_first() {
            Some((_, key_rest)) => matches_words(rest, key_rest),
            None => false,
        },
        Some((word, rest)) => match key.split_first() {
            Some((key_word, key_rest)) => word == key_word && matches_words(rest, key_rest),
            None => false,
        },
    }
}
