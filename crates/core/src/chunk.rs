use std::fmt;

use serde::{Deserialize, Serialize};

use crate::portfolio::{BlogPost, Experience, PortfolioDocument, Project};

pub const PERSONAL_CHUNK_ID: &str = "personal_info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Personal,
    Skills,
    Project,
    Experience,
    Blog,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Personal => "personal",
            ChunkKind::Skills => "skills",
            ChunkKind::Project => "project",
            ChunkKind::Experience => "experience",
            ChunkKind::Blog => "blog",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkMetadata {
    Personal {
        id: String,
    },
    Skills {
        id: String,
        category: String,
    },
    Project {
        id: String,
        title: String,
        category: String,
        featured: bool,
    },
    Experience {
        id: String,
        company: String,
        role: String,
    },
    Blog {
        id: String,
        title: String,
        slug: String,
    },
}

impl ChunkMetadata {
    pub fn kind(&self) -> ChunkKind {
        match self {
            ChunkMetadata::Personal { .. } => ChunkKind::Personal,
            ChunkMetadata::Skills { .. } => ChunkKind::Skills,
            ChunkMetadata::Project { .. } => ChunkKind::Project,
            ChunkMetadata::Experience { .. } => ChunkKind::Experience,
            ChunkMetadata::Blog { .. } => ChunkKind::Blog,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChunkMetadata::Personal { id }
            | ChunkMetadata::Skills { id, .. }
            | ChunkMetadata::Project { id, .. }
            | ChunkMetadata::Experience { id, .. }
            | ChunkMetadata::Blog { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn kind(&self) -> ChunkKind {
        self.metadata.kind()
    }

    /// Index id, `<type>_<ordinal>`, where the ordinal is the chunk position in
    /// the chunker output.
    pub fn index_id(&self, ordinal: usize) -> String {
        format!("{}_{}", self.kind(), ordinal)
    }
}

/// Window parameters carried for sliding-window chunking. Portfolio records
/// are short, so `Chunker` emits one chunk per record regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunk_document(&self, doc: &PortfolioDocument) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(
            1 + doc.skills.len() + doc.projects.len() + doc.experience.len() + doc.blog_posts.len(),
        );
        chunks.push(personal_chunk(doc));
        for (category, skills) in &doc.skills {
            chunks.push(skills_chunk(category, skills));
        }
        chunks.extend(doc.projects.iter().map(project_chunk));
        chunks.extend(doc.experience.iter().map(experience_chunk));
        chunks.extend(doc.blog_posts.iter().map(blog_chunk));
        tracing::debug!("chunks" = chunks.len(), "chunk_size" = self.config.chunk_size);
        chunks
    }
}

pub fn build_chunks(doc: &PortfolioDocument) -> Vec<Chunk> {
    Chunker::default().chunk_document(doc)
}

fn personal_chunk(doc: &PortfolioDocument) -> Chunk {
    let personal = &doc.personal;
    Chunk {
        text: format!("{} - {}. {}", personal.name, personal.title, personal.bio)
            .trim()
            .to_string(),
        metadata: ChunkMetadata::Personal {
            id: PERSONAL_CHUNK_ID.to_string(),
        },
    }
}

fn skills_chunk(category: &str, skills: &[String]) -> Chunk {
    Chunk {
        text: format!("{} skills: {}", title_case(category), skills.join(", ")),
        metadata: ChunkMetadata::Skills {
            id: category.to_string(),
            category: category.to_string(),
        },
    }
}

fn project_chunk(project: &Project) -> Chunk {
    let text = [
        format!("Project: {}", project.title),
        format!("Description: {}", project.best_description()),
        format!("Technologies: {}", project.tech_stack.join(", ")),
        format!("Highlights: {}", project.highlights.join(" ")),
        format!("Category: {}", project.category),
    ]
    .join("\n");
    Chunk {
        text,
        metadata: ChunkMetadata::Project {
            id: project.id.clone(),
            title: project.title.clone(),
            category: project.category.clone(),
            featured: project.featured,
        },
    }
}

fn experience_chunk(exp: &Experience) -> Chunk {
    let text = [
        format!("Role: {} at {}", exp.role, exp.company),
        format!("Duration: {}", exp.duration),
        format!("Description: {}", exp.description),
        format!("Responsibilities: {}", exp.responsibilities.join(" ")),
        format!("Achievements: {}", exp.achievements.join(" ")),
        format!("Technologies: {}", exp.tech_stack.join(", ")),
    ]
    .join("\n");
    Chunk {
        text,
        metadata: ChunkMetadata::Experience {
            id: exp.id.clone(),
            company: exp.company.clone(),
            role: exp.role.clone(),
        },
    }
}

fn blog_chunk(post: &BlogPost) -> Chunk {
    let text = [
        format!("Blog Post: {}", post.title),
        format!("Summary: {}", post.excerpt),
        format!("Category: {}", post.category),
        format!("Tags: {}", post.tags.join(", ")),
    ]
    .join("\n");
    Chunk {
        text,
        metadata: ChunkMetadata::Blog {
            id: post.id.clone(),
            title: post.title.clone(),
            slug: post.slug.clone(),
        },
    }
}

// "machine_learning" -> "Machine Learning"
fn title_case(key: &str) -> String {
    key.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_skill_keys() {
        assert_eq!(title_case("machine_learning"), "Machine Learning");
        assert_eq!(title_case("DEVOPS"), "Devops");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn empty_document_still_has_personal_chunk() {
        let chunks = build_chunks(&PortfolioDocument::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind(), ChunkKind::Personal);
        assert!(!chunks[0].text.is_empty());
        assert_eq!(chunks[0].metadata.id(), PERSONAL_CHUNK_ID);
    }

    #[test]
    fn project_prefers_long_description() {
        let project = Project {
            id: "p1".to_string(),
            title: "Search".to_string(),
            description: "short".to_string(),
            long_description: Some("a much longer story".to_string()),
            tech_stack: vec!["Rust".to_string(), "Tantivy".to_string()],
            highlights: vec!["Fast.".to_string(), "Small.".to_string()],
            category: "backend".to_string(),
            featured: true,
            ..Default::default()
        };
        let chunk = project_chunk(&project);
        assert!(chunk.text.contains("Description: a much longer story"));
        assert!(chunk.text.contains("Technologies: Rust, Tantivy"));
        assert!(chunk.text.contains("Highlights: Fast. Small."));
        assert_eq!(
            chunk.metadata,
            ChunkMetadata::Project {
                id: "p1".to_string(),
                title: "Search".to_string(),
                category: "backend".to_string(),
                featured: true,
            }
        );
    }

    #[test]
    fn metadata_serializes_with_type_tag() {
        let meta = ChunkMetadata::Blog {
            id: "b1".to_string(),
            title: "Hello".to_string(),
            slug: "hello".to_string(),
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["type"], "blog");
        assert_eq!(value["slug"], "hello");
    }

    #[test]
    fn index_ids_use_kind_and_ordinal() {
        let chunks = build_chunks(&PortfolioDocument::default());
        assert_eq!(chunks[0].index_id(0), "personal_0");
    }
}
