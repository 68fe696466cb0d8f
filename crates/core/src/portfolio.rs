use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Structured portfolio source. Every section is optional on input; unknown
/// fields are kept in `extra` so projections return the file unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDocument {
    #[serde(default)]
    pub personal: Personal,
    #[serde(default)]
    pub skills: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub blog_posts: Vec<BlogPost>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    pub fn best_description(&self) -> &str {
        match self.long_description.as_deref() {
            Some(long) if !long.trim().is_empty() => long,
            _ => &self.description,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortfolioDocument {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == id)
    }

    /// Stable digest of the document content. Map keys serialize in a fixed
    /// order (`IndexMap` keeps file order, `serde_json::Map` is sorted).
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_default_to_empty() {
        let doc = PortfolioDocument::from_json(r#"{"personal": {"name": "Ada"}}"#).unwrap();
        assert_eq!(doc.personal.name, "Ada");
        assert!(doc.personal.bio.is_empty());
        assert!(doc.skills.is_empty());
        assert!(doc.projects.is_empty());
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let raw = r#"{"projects": [{"id": "p1", "title": "T", "github_url": "https://x"}]}"#;
        let doc = PortfolioDocument::from_json(raw).unwrap();
        let value = serde_json::to_value(&doc.projects[0]).unwrap();
        assert_eq!(value["github_url"], "https://x");
    }

    #[test]
    fn long_description_falls_back_when_blank() {
        let mut project = Project {
            description: "short".to_string(),
            long_description: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(project.best_description(), "short");
        project.long_description = Some("long".to_string());
        assert_eq!(project.best_description(), "long");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut doc = PortfolioDocument::default();
        let first = doc.fingerprint().unwrap();
        assert_eq!(first, doc.fingerprint().unwrap());
        doc.personal.bio = "changed".to_string();
        assert_ne!(first, doc.fingerprint().unwrap());
    }
}
