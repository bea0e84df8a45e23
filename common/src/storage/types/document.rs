use serde::{Deserialize, Serialize};

/// A source page handed over by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub content: String,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_category() -> String {
    "General".to_string()
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            category: default_category(),
            last_updated: String::new(),
            content: content.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let doc: Document =
            serde_json::from_str(r#"{"id": "page-1", "content": "Use 0.18mm pens."}"#)
                .expect("document should parse");
        assert_eq!(doc.title, "Untitled");
        assert_eq!(doc.category, "General");
        assert_eq!(doc.word_count(), 3);
    }
}
