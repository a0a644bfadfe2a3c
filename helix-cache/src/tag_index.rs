//! Tag Index (§3): bidirectional `tag → keys` / `key → tags` mapping,
//! kept alongside L1 under one lock (§5: "a single synchronised unit").

use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, Vec<String>>,
}

impl TagIndex {
    pub fn insert(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            self.tag_to_keys.entry(tag.clone()).or_default().insert(key.to_string());
        }
        self.key_to_tags.insert(key.to_string(), tags.to_vec());
    }

    pub fn remove_key(&mut self, key: &str) {
        if let Some(tags) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tag_to_keys.remove(&tag);
                    }
                }
            }
        }
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tag_to_keys.get(tag).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tag_to_keys.remove(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_is_bidirectionally_consistent() {
        let mut idx = TagIndex::default();
        idx.insert("k1", &["prov:x".to_string(), "mdl:m".to_string()]);
        idx.insert("k2", &["mdl:m".to_string()]);

        assert_eq!(idx.keys_for_tag("mdl:m").len(), 2);
        idx.remove_key("k1");
        assert_eq!(idx.keys_for_tag("mdl:m"), vec!["k2".to_string()]);
        assert!(idx.keys_for_tag("prov:x").is_empty());
    }
}
