use crate::directory::{DirectoryError, NodeDirectory, TargetNode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Directory backed by a JSON array of nodes on disk
///
/// The file is read on every call, so edits take effect on the next cycle.
#[derive(Debug, Clone)]
pub struct FileNodeDirectory {
    path: PathBuf,
    static_nodes: Vec<TargetNode>,
}

impl FileNodeDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            static_nodes: Vec::new(),
        }
    }

    /// Adds nodes that are listed in addition to the file contents
    ///
    /// A file entry with the same id takes precedence.
    pub fn with_static_nodes(mut self, nodes: Vec<TargetNode>) -> Self {
        self.static_nodes = nodes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl NodeDirectory for FileNodeDirectory {
    async fn list_nodes(&self) -> Result<Vec<TargetNode>, DirectoryError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| DirectoryError::Io {
                    path: self.path.clone(),
                    source,
                })?;

        let mut nodes: Vec<TargetNode> =
            serde_json::from_str(&content).map_err(|source| DirectoryError::Parse {
                path: self.path.clone(),
                source,
            })?;

        for node in &self.static_nodes {
            if !nodes.iter().any(|n| n.id == node.id) {
                nodes.push(node.clone());
            }
        }

        tracing::trace!("Read {} nodes from {}", nodes.len(), self.path.display());
        Ok(nodes)
    }
}
