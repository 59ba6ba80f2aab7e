//! Collection validator inference
//!
//! Builds a `$jsonSchema` validator for a root collection from its schema
//! tree and the values actually observed in its materialized documents.
//! Statistics are accumulated in one pass and the validator is built once
//! at the end.

use crate::model::Collection;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// BSON type of an observed JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BsonType {
    Null,
    Bool,
    Int,
    Long,
    Double,
    String,
    Array,
    Object,
}

impl BsonType {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => BsonType::Null,
            Value::Bool(_) => BsonType::Bool,
            Value::Number(n) => match n.as_i64() {
                Some(i) if i32::try_from(i).is_ok() => BsonType::Int,
                Some(_) => BsonType::Long,
                None => BsonType::Double,
            },
            Value::String(_) => BsonType::String,
            Value::Array(_) => BsonType::Array,
            Value::Object(_) => BsonType::Object,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            BsonType::Null => "null",
            BsonType::Bool => "bool",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::String => "string",
            BsonType::Array => "array",
            BsonType::Object => "object",
        }
    }
}

/// Types seen for one attribute, in first-seen order
#[derive(Debug, Default)]
struct AttributeStats {
    types: Vec<BsonType>,
    present: usize,
}

impl AttributeStats {
    fn add_value(&mut self, value: &Value) {
        self.present += 1;
        let bson_type = BsonType::from_value(value);
        if !self.types.contains(&bson_type) {
            self.types.push(bson_type);
        }
    }

    fn build(&self) -> Value {
        let mut types: Vec<&str> = self
            .types
            .iter()
            .filter(|t| **t != BsonType::Null)
            .map(|t| t.as_str())
            .collect();
        if self.types.contains(&BsonType::Null) {
            types.push(BsonType::Null.as_str());
        }

        match types.as_slice() {
            [] => json!({}),
            [single] => json!({ "bsonType": single }),
            _ => json!({ "bsonType": types }),
        }
    }
}

/// Accumulates the documents of one collection and its embedded children.
#[derive(Debug)]
pub struct ValidatorBuilder<'c> {
    collection: &'c Collection,
    documents: usize,
    attributes: HashMap<&'c str, AttributeStats>,
    children: Vec<ValidatorBuilder<'c>>,
}

impl<'c> ValidatorBuilder<'c> {
    pub fn new(collection: &'c Collection) -> Self {
        ValidatorBuilder {
            collection,
            documents: 0,
            attributes: HashMap::new(),
            children: collection
                .embedded_collections
                .iter()
                .map(ValidatorBuilder::new)
                .collect(),
        }
    }

    pub fn add_document(&mut self, document: &Value) {
        let Value::Object(fields) = document else {
            return;
        };
        self.documents += 1;

        let collection = self.collection;
        for attribute in &collection.attributes {
            if let Some(value) = fields.get(attribute) {
                self.attributes
                    .entry(attribute.as_str())
                    .or_default()
                    .add_value(value);
            }
        }

        for child in &mut self.children {
            if let Some(Value::Array(items)) = fields.get(&child.collection.name) {
                for item in items {
                    child.add_document(item);
                }
            }
        }
    }

    /// The object schema of this collection
    pub fn build(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for attribute in &self.collection.attributes {
            let stats = self.attributes.get(attribute.as_str());
            let schema = stats.map_or_else(|| json!({}), AttributeStats::build);
            properties.insert(attribute.clone(), schema);

            let present = stats.map_or(0, |s| s.present);
            if self.documents > 0 && present == self.documents {
                required.push(Value::String(attribute.clone()));
            }
        }

        for child in &self.children {
            properties.insert(
                child.collection.name.clone(),
                json!({ "bsonType": "array", "items": child.build() }),
            );
        }

        let mut schema = Map::new();
        schema.insert("bsonType".to_string(), json!("object"));
        schema.insert("title".to_string(), json!(self.collection.name));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema.insert("properties".to_string(), Value::Object(properties));
        Value::Object(schema)
    }
}

/// `$jsonSchema` validator for a root collection and its documents
pub fn infer_validator(collection: &Collection, documents: &[Value]) -> Value {
    let mut builder = ValidatorBuilder::new(collection);
    for document in documents {
        builder.add_document(document);
    }
    json!({ "$jsonSchema": builder.build() })
}
