//! Collection schema for post documents.

use serde_json::{json, Value};

/// Collection holding one document per post.
pub const POST_COLLECTION: &str = "Post";

const VECTORIZER: &str = "text2vec-openai";
const EMBEDDING_MODEL: &str = "text-embedding-3-large";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Number,
}

impl DataType {
    fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Number => "number",
        }
    }
}

/// One property of a collection.
#[derive(Debug, Clone)]
pub struct PropertySchema {
    pub name: &'static str,
    pub data_type: DataType,
    pub skip_vectorization: bool,
    pub filterable: bool,
    pub searchable: bool,
}

impl PropertySchema {
    const fn new(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            skip_vectorization: false,
            filterable: true,
            searchable: true,
        }
    }

    const fn unvectorized(mut self) -> Self {
        self.skip_vectorization = true;
        self
    }

    const fn unindexed(mut self) -> Self {
        self.filterable = false;
        self.searchable = false;
        self
    }

    fn to_json(&self) -> Value {
        let mut property = json!({
            "name": self.name,
            "dataType": [self.data_type.as_str()],
            "moduleConfig": { VECTORIZER: { "skip": self.skip_vectorization } },
        });
        if !self.filterable {
            property["indexFilterable"] = json!(false);
        }
        if !self.searchable {
            property["indexSearchable"] = json!(false);
        }
        property
    }
}

/// A collection definition.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub name: String,
    pub properties: Vec<PropertySchema>,
}

impl CollectionSchema {
    /// The post collection: identifiers and the snapshot are kept out of the
    /// embedding, and the snapshot is not indexed at all.
    pub fn post() -> Self {
        Self {
            name: POST_COLLECTION.to_string(),
            properties: vec![
                PropertySchema::new("post_id", DataType::Text).unvectorized(),
                PropertySchema::new("url", DataType::Text).unvectorized(),
                PropertySchema::new("description", DataType::Text),
                PropertySchema::new("impact_score", DataType::Number).unvectorized(),
                PropertySchema::new("search_term", DataType::Text),
                PropertySchema::new("transcript", DataType::Text),
                PropertySchema::new("text_elements", DataType::Text),
                PropertySchema::new("shooting_style", DataType::Text).unvectorized(),
                PropertySchema::new("object", DataType::Text)
                    .unvectorized()
                    .unindexed(),
            ],
        }
    }

    /// Class definition for `POST /v1/schema`.
    pub fn to_json(&self) -> Value {
        json!({
            "class": self.name,
            "vectorizer": VECTORIZER,
            "moduleConfig": { VECTORIZER: { "model": EMBEDDING_MODEL } },
            "properties": self.properties.iter().map(PropertySchema::to_json).collect::<Vec<_>>(),
        })
    }
}
