use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::Publisher;
use herald_core::types::DocumentRef;

/// Publishes each asset as a Markdown file in a directory.
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Lowercase, dash-separated file stem for a title.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "asset".to_string()
    } else {
        slug.chars().take(80).collect()
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(
        &self,
        asset_type: String,
        title: String,
        body: String,
    ) -> BoxFuture<'_, Result<DocumentRef>> {
        Box::pin(async move {
            let fail = |e: std::io::Error| {
                HeraldError::PublishFailed(format!("{}: {}", self.dir.display(), e))
            };
            tokio::fs::create_dir_all(&self.dir).await.map_err(fail)?;

            let id = format!(
                "{}-{}",
                slugify(&title),
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            );
            let path = self.dir.join(format!("{}.md", id));
            let contents = format!(
                "# {}\n\n_Asset type: {}_\n\n{}\n",
                title,
                asset_type,
                body.trim_end()
            );
            tokio::fs::write(&path, contents).await.map_err(fail)?;
            debug!(path = %path.display(), "Wrote published asset");

            Ok(DocumentRef {
                id,
                url: format!("file://{}", path.display()),
            })
        })
    }
}
