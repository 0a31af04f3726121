//! Filter helpers for Qdrant point queries.

use serde_json::{Value, json};

/// Exact-match filter selecting every point stored for `session_id`.
pub fn session_filter(session_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "session_id",
                "match": { "value": session_id }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_filter_matches_keyword_field() {
        let filter = session_filter("abc");
        let clause = &filter["must"][0];
        assert_eq!(clause["key"], "session_id");
        assert_eq!(clause["match"]["value"], "abc");
        assert_eq!(filter["must"].as_array().map(Vec::len), Some(1));
    }
}
