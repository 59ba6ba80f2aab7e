use serde::Serialize;
use std::collections::VecDeque;

/// How a collection pulls in data beyond its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment<'a> {
    /// Embedded child collections become nested arrays
    ChildCollections,
    /// Each document is fanned out over the matching rows of another table
    MergedAttributesFrom(&'a str),
}

/// A document collection; embedded collections form a strict tree.
///
/// `embedded_attributes_from` names a collection elsewhere in the schema
/// and is resolved by name, never owned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub name: String,
    pub attributes: Vec<String>,
    pub embedded_collections: Vec<Collection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_attributes_from: Option<String>,
}

impl Collection {
    pub fn new<I, S>(name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collection = Collection {
            name: name.into(),
            attributes: Vec::new(),
            embedded_collections: Vec::new(),
            embedded_attributes_from: None,
        };
        for attribute in attributes {
            collection.add_attribute(attribute);
        }
        collection
    }

    /// Append an attribute unless it is already declared.
    pub fn add_attribute(&mut self, attribute: impl Into<String>) {
        let attribute = attribute.into();
        if !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    pub fn add_embedded_collection(&mut self, collection: Collection) {
        self.embedded_collections.push(collection);
    }

    pub fn with_embedded_attributes_from(mut self, collection: impl Into<String>) -> Self {
        self.embedded_attributes_from = Some(collection.into());
        self
    }

    pub fn has_embedded_attributes(&self) -> bool {
        self.embedded_attributes_from.is_some()
    }

    pub fn attachment(&self) -> Attachment<'_> {
        match self.embedded_attributes_from.as_deref() {
            Some(source) => Attachment::MergedAttributesFrom(source),
            None => Attachment::ChildCollections,
        }
    }

    /// Number of collections in this subtree, this one included.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .embedded_collections
            .iter()
            .map(Collection::subtree_len)
            .sum::<usize>()
    }
}

/// The document schema: an ordered list of root collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoSqlModel {
    pub name: String,
    pub collections: Vec<Collection>,
}

impl NoSqlModel {
    pub fn new(name: impl Into<String>) -> Self {
        NoSqlModel {
            name: name.into(),
            collections: Vec::new(),
        }
    }

    pub fn add_collection(&mut self, collection: Collection) {
        self.collections.push(collection);
    }

    /// Breadth-first lookup; the first collection with this name wins.
    pub fn find(&self, name: &str) -> Option<&Collection> {
        let mut queue: VecDeque<&Collection> = self.collections.iter().collect();
        while let Some(current) = queue.pop_front() {
            if current.name == name {
                return Some(current);
            }
            queue.extend(current.embedded_collections.iter());
        }
        None
    }

    /// Mutable counterpart of [`NoSqlModel::find`], same match order.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Collection> {
        let path = self.path_to(name)?;
        let (first, rest) = path.split_first()?;
        let mut current = self.collections.get_mut(*first)?;
        for &i in rest {
            current = current.embedded_collections.get_mut(i)?;
        }
        Some(current)
    }

    fn path_to(&self, name: &str) -> Option<Vec<usize>> {
        let mut queue: VecDeque<(Vec<usize>, &Collection)> = self
            .collections
            .iter()
            .enumerate()
            .map(|(i, c)| (vec![i], c))
            .collect();

        while let Some((path, current)) = queue.pop_front() {
            if current.name == name {
                return Some(path);
            }
            for (i, child) in current.embedded_collections.iter().enumerate() {
                let mut child_path = path.clone();
                child_path.push(i);
                queue.push_back((child_path, child));
            }
        }
        None
    }

    pub fn collection_count(&self) -> usize {
        self.collections.iter().map(Collection::subtree_len).sum()
    }
}
