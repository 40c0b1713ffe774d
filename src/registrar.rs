//! Image Registrar: ensures the sandbox images required by the languages
//! this core supports exist locally, building them on demand.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::domain::Language;

pub type RegistrarResult<T> = Result<T, RegistrarError>;

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("docker daemon error: {0}")]
    Daemon(String),
    #[error("image build failed for {tag}: {reason}")]
    BuildFailed { tag: String, reason: String },
    #[error("no build context configured for language {0}")]
    NoBuildContext(String),
}

/// Returns the deterministic image tag for a language.
pub fn image_tag(language: Language) -> String {
    format!("coderunner-{}:latest", language.tag())
}

/// Ensures the sandbox images this core's supported languages need exist
/// before the coordinator hands them to the [`crate::sandbox`]. Abstracted
/// so the coordinator can be tested without a real daemon.
#[async_trait]
pub trait ImageRegistrar: Send + Sync {
    async fn ensure_ready(&self, languages: &[Language]) -> RegistrarResult<()>;
    async fn ensure_image(&self, language: Language) -> RegistrarResult<()>;
}

/// Ensures the sandbox images required by this core's supported languages
/// exist, building missing ones from a per-language build root.
///
/// Concurrent requests for the same missing tag collapse into a single
/// build via a per-tag [`OnceCell`], never racing the daemon.
pub struct DockerRegistrar {
    docker: Docker,
    build_root: PathBuf,
    builds: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl DockerRegistrar {
    pub fn new(docker: Docker, build_root: PathBuf) -> Self {
        Self {
            docker,
            build_root,
            builds: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ImageRegistrar for DockerRegistrar {
    /// Runs at startup: builds every configured language's image if
    /// missing. Fatal on failure.
    async fn ensure_ready(&self, languages: &[Language]) -> RegistrarResult<()> {
        for language in languages {
            self.ensure_image(*language).await?;
        }
        Ok(())
    }

    /// Ensures a single language's image is present, building it if
    /// necessary. Safe to call concurrently for the same language.
    async fn ensure_image(&self, language: Language) -> RegistrarResult<()> {
        let tag = image_tag(language);

        if self.image_exists(&tag).await? {
            return Ok(());
        }

        let build_cell = {
            let mut builds = self.builds.lock().await;
            builds
                .entry(tag.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        build_cell
            .get_or_try_init(|| async {
                info!(tag = %tag, "building sandbox image");
                self.build_image(language, &tag).await?;
                info!(tag = %tag, "sandbox image build complete");
                Ok::<(), RegistrarError>(())
            })
            .await?;

        Ok(())
    }
}

impl DockerRegistrar {
    async fn image_exists(&self, tag: &str) -> RegistrarResult<bool> {
        match self.docker.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(false),
            Err(e) => Err(RegistrarError::Daemon(e.to_string())),
        }
    }

    async fn build_image(&self, language: Language, tag: &str) -> RegistrarResult<()> {
        let context_dir = self.build_root.join(language.tag());
        if !context_dir.join("Dockerfile").exists() {
            return Err(RegistrarError::NoBuildContext(language.to_string()));
        }

        let tar_data = build_context_tar(&context_dir)
            .map_err(|e| RegistrarError::BuildFailed { tag: tag.to_string(), reason: e.to_string() })?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(tar_data.into()));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(RegistrarError::BuildFailed { tag: tag.to_string(), reason: error });
                    }
                }
                Err(e) => {
                    warn!(tag = %tag, error = %e, "image build stream error");
                    return Err(RegistrarError::BuildFailed { tag: tag.to_string(), reason: e.to_string() });
                }
            }
        }

        Ok(())
    }
}

fn build_context_tar(dir: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    archive.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tag_is_deterministic_per_language() {
        assert_eq!(image_tag(Language::Cpp), "coderunner-cpp:latest");
    }
}
