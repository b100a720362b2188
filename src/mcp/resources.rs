//! MCP resources: built-in help texts plus text files from a directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TEXT_PLAIN: &str = "text/plain";

const WORLD_BUILDING_NOTES: &str = include_str!("../../resources/world-building-notes.md");
const UDON_SCRIPT_EXAMPLE: &str = include_str!("../../resources/udon-script-example.cs");

/// Resource metadata returned by `resources/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One entry of a `resources/read` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone)]
enum Source {
    Builtin(&'static str),
    File(PathBuf),
}

#[derive(Debug, Clone)]
struct Resource {
    definition: ResourceDefinition,
    source: Source,
}

/// Every resource the server exposes
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
}

impl ResourceCatalog {
    /// Only the built-in help resources
    pub fn builtin() -> Self {
        let help = |uri: &str, name: &str, description: &str, text: &'static str| Resource {
            definition: ResourceDefinition {
                uri: uri.to_string(),
                name: name.to_string(),
                mime_type: TEXT_PLAIN.to_string(),
                description: Some(description.to_string()),
            },
            source: Source::Builtin(text),
        };

        Self {
            resources: vec![
                help(
                    "help:///vrchat/world-building-notes",
                    "VRChatWorldNotes.md",
                    "VRChat world building notes and tips for UdonSharp and Unity editor commands.",
                    WORLD_BUILDING_NOTES,
                ),
                help(
                    "help:///vrchat/udon-script-example",
                    "UdonScriptExample",
                    "Example editor command that creates a GameObject and attaches an UdonSharp script to it.",
                    UDON_SCRIPT_EXAMPLE,
                ),
            ],
        }
    }

    /// Built-in resources plus every regular file in `dir`
    ///
    /// A missing or unreadable directory only adds nothing.
    pub async fn load(dir: Option<&Path>) -> Self {
        let mut catalog = Self::builtin();
        let Some(dir) = dir else {
            return catalog;
        };

        match text_files(dir).await {
            Ok(files) => {
                debug!("Loaded {} text resource(s) from {}", files.len(), dir.display());
                catalog.resources.extend(files.into_iter().map(file_resource));
            }
            Err(e) => warn!("Cannot load text resources from {}: {}", dir.display(), e),
        }
        catalog
    }

    pub fn list(&self) -> Vec<ResourceDefinition> {
        self.resources.iter().map(|r| r.definition.clone()).collect()
    }

    /// Contents for `uri`, or `None` when no such resource exists
    pub async fn read(&self, uri: &str) -> Option<ResourceContents> {
        let resource = self.resources.iter().find(|r| r.definition.uri == uri)?;

        let text = match &resource.source {
            Source::Builtin(text) => text.to_string(),
            Source::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Error reading text resource {}: {}", path.display(), e);
                    format!("Error loading text file: {}", resource.definition.name)
                }
            },
        };

        Some(ResourceContents {
            uri: resource.definition.uri.clone(),
            mime_type: resource.definition.mime_type.clone(),
            text,
        })
    }
}

async fn text_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_resource(path: PathBuf) -> Resource {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Resource {
        definition: ResourceDefinition {
            uri: format!("file:///{}", name),
            name: name.clone(),
            mime_type: TEXT_PLAIN.to_string(),
            description: Some(format!("Text file: {}", name)),
        },
        source: Source::File(path),
    }
}
