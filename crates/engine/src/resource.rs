//! Resources produced by successful runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A file stored as part of the run results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResource {
    /// Identifier, unique within the resources of one run.
    pub id: String,
    /// Path to the stored file.
    pub filepath: PathBuf,
}

/// Resource descriptor tagged by resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resource {
    File(FileResource),
}

impl Resource {
    /// Create a file resource.
    pub fn file(id: impl Into<String>, filepath: impl Into<PathBuf>) -> Self {
        Resource::File(FileResource {
            id: id.into(),
            filepath: filepath.into(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Resource::File(f) => &f.id,
        }
    }

    /// Path of a file resource.
    pub fn filepath(&self) -> Option<&Path> {
        match self {
            Resource::File(f) => Some(&f.filepath),
        }
    }
}

/// Resources of a run keyed by identifier. Serialized as a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Resource>", try_from = "Vec<Resource>")]
pub struct ResourceSet {
    resources: BTreeMap<String, Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Returns false if the identifier is taken.
    pub fn insert(&mut self, resource: Resource) -> bool {
        if self.resources.contains_key(resource.id()) {
            return false;
        }
        self.resources.insert(resource.id().to_string(), resource);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }
}

impl From<ResourceSet> for Vec<Resource> {
    fn from(set: ResourceSet) -> Self {
        set.resources.into_values().collect()
    }
}

impl TryFrom<Vec<Resource>> for ResourceSet {
    type Error = String;

    fn try_from(resources: Vec<Resource>) -> Result<Self, Self::Error> {
        let mut set = ResourceSet::new();
        for resource in resources {
            let id = resource.id().to_string();
            if !set.insert(resource) {
                return Err(format!("duplicate resource '{}'", id));
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_as_list() {
        let mut set = ResourceSet::new();
        assert!(set.insert(Resource::file("results/b.txt", "/runs/1/results/b.txt")));
        assert!(set.insert(Resource::file("results/a.txt", "/runs/1/results/a.txt")));
        assert!(!set.insert(Resource::file("results/a.txt", "/other")));

        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            json!([
                {"type": "file", "id": "results/a.txt", "filepath": "/runs/1/results/a.txt"},
                {"type": "file", "id": "results/b.txt", "filepath": "/runs/1/results/b.txt"}
            ])
        );
        let parsed: ResourceSet = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        let value = json!([
            {"type": "file", "id": "a", "filepath": "/x"},
            {"type": "file", "id": "a", "filepath": "/y"}
        ]);
        assert!(serde_json::from_value::<ResourceSet>(value).is_err());
    }
}
