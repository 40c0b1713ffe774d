//! Sandbox Runner: creates, starts, waits on, drains, and tears down one
//! disposable container per evaluation, enforcing strict resource limits.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use async_trait::async_trait;
use bollard::Docker;
use futures::StreamExt;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("docker daemon error: {0}")]
    Daemon(String),
    #[error("filesystem error preparing sandbox: {0}")]
    Filesystem(String),
}

/// Inputs to one sandbox run.
pub struct SandboxConfig {
    pub execution_id: Uuid,
    pub image_tag: String,
    pub compile_and_run_command: String,
    pub working_dir: String,
    pub extension: String,
    pub harness_source: String,
    pub memory_mb: i64,
    pub cpu_cores: f64,
    pub timeout: Duration,
    pub host_root: PathBuf,
}

/// Result of running a harness in the sandbox. A non-fatal outcome —
/// `timed_out`, a non-zero exit code, or stderr content are all ordinary
/// results, not errors.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Runs one harness and reports how it finished. Abstracted so the
/// coordinator can be tested against a fake that never touches a real
/// daemon (spec.md §8's end-to-end scenarios rely on this).
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, cfg: &SandboxConfig) -> SandboxResult<RunOutcome>;
}

/// Runs one harness inside a disposable, resource-constrained Docker
/// container and guarantees the container is gone before returning,
/// regardless of how the run finished.
pub struct DockerSandboxRunner {
    docker: Docker,
}

impl DockerSandboxRunner {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl SandboxRunner for DockerSandboxRunner {
    async fn run(&self, cfg: &SandboxConfig) -> SandboxResult<RunOutcome> {
        let container_name = format!("coderunner-{}", cfg.execution_id);
        let host_dir = prepare_host_dir(cfg)?;

        let container_id = self.create_container(&container_name, &host_dir, cfg).await?;
        let guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

        let result: SandboxResult<RunOutcome> = async {
            self.docker
                .start_container(&container_id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| SandboxError::Daemon(e.to_string()))?;

            let outcome = self.wait_for_completion(&container_id, cfg.timeout).await?;
            let (stdout, stderr) = if outcome.timed_out {
                (String::new(), String::new())
            } else {
                self.drain_logs(&container_id).await?
            };

            Ok(RunOutcome {
                exit_code: outcome.exit_code,
                stdout,
                stderr,
                timed_out: outcome.timed_out,
            })
        }
        .await;

        // Every exit path from the block above — success or any daemon
        // error — still leaves a container behind; clean it up regardless
        // of which branch produced `result`.
        guard.cleanup().await;

        result
    }
}

impl DockerSandboxRunner {
    async fn create_container(
        &self,
        name: &str,
        host_dir: &Path,
        cfg: &SandboxConfig,
    ) -> SandboxResult<String> {
        let host_config = HostConfig {
            binds: Some(vec![format!("{}:{}", host_dir.display(), cfg.working_dir)]),
            network_mode: Some("none".to_string()),
            memory: Some(cfg.memory_mb * 1024 * 1024),
            nano_cpus: Some((cfg.cpu_cores * 1_000_000_000.0) as i64),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(cfg.image_tag.clone()),
            working_dir: Some(cfg.working_dir.clone()),
            cmd: Some(vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                cfg.compile_and_run_command.clone(),
            ]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| SandboxError::Daemon(e.to_string()))?;

        Ok(response.id)
    }

    async fn wait_for_completion(&self, container_id: &str, deadline: Duration) -> SandboxResult<RunOutcome> {
        let mut wait_stream = self.docker.wait_container(
            container_id,
            None::<WaitContainerOptions<String>>,
        );

        match timeout(deadline, wait_stream.next()).await {
            Ok(Some(Ok(response))) => Ok(RunOutcome {
                exit_code: Some(response.status_code as i32),
                timed_out: false,
                ..Default::default()
            }),
            Ok(Some(Err(e))) => Err(SandboxError::Daemon(e.to_string())),
            Ok(None) => Err(SandboxError::Daemon("wait stream ended without a result".to_string())),
            Err(_) => Ok(RunOutcome {
                exit_code: None,
                timed_out: true,
                ..Default::default()
            }),
        }
    }

    async fn drain_logs(&self, container_id: &str) -> SandboxResult<(String, String)> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));
        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|e| SandboxError::Daemon(e.to_string()))? {
                LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                _ => {}
            }
        }

        Ok((stdout, stderr))
    }
}

/// Writes the harness to `<host_root>/compiled_test_codes/<execution-id>/`
/// with permissions the sandbox's numeric uid 1000 can read, write, and
/// execute.
fn prepare_host_dir(cfg: &SandboxConfig) -> SandboxResult<PathBuf> {
    let dir = cfg
        .host_root
        .join("compiled_test_codes")
        .join(cfg.execution_id.to_string());

    std::fs::create_dir_all(&dir).map_err(|e| SandboxError::Filesystem(e.to_string()))?;

    let solution_path = dir.join(format!("solution.{}", cfg.extension));
    std::fs::write(&solution_path, &cfg.harness_source).map_err(|e| SandboxError::Filesystem(e.to_string()))?;

    if let Err(e) = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o777)) {
        warn!(error = %e, "could not relax sandbox directory permissions; continuing");
    }
    if let Err(e) = chown_to_sandbox_user(&dir) {
        warn!(error = %e, "chown to sandbox uid not supported on this platform; continuing");
    }

    Ok(dir)
}

#[cfg(target_os = "linux")]
fn chown_to_sandbox_user(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::chown;
    chown(dir, Some(1000), Some(1000))
}

#[cfg(not(target_os = "linux"))]
fn chown_to_sandbox_user(_dir: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "chown unsupported"))
}

/// Guarantees a container is stopped and force-removed exactly once,
/// using a detached context with its own timeout so a cancelled caller
/// still reclaims the container.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }

    async fn cleanup(self) {
        let docker = self.docker;
        let container_id = self.container_id;

        let handle = tokio::spawn(async move {
            let _ = docker
                .stop_container(&container_id, Some(bollard::container::StopContainerOptions { t: 5 }))
                .await;
            let _ = docker
                .remove_container(
                    &container_id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        });

        if timeout(Duration::from_secs(10), handle).await.is_err() {
            warn!("sandbox cleanup did not finish within its detached deadline");
        }
    }
}

/// Bind mount plus host environment passed into the container, kept
/// separate from [`SandboxConfig`] so callers can assemble env without
/// touching the lower-level run contract.
#[allow(dead_code)]
pub struct SandboxEnv(pub HashMap<String, String>);

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host_root: PathBuf) -> SandboxConfig {
        SandboxConfig {
            execution_id: Uuid::new_v4(),
            image_tag: "coderunner-eval/cpp:latest".to_string(),
            compile_and_run_command: "g++ -std=c++17 -O2 -o solution solution.cpp && ./solution".to_string(),
            working_dir: "/workspace".to_string(),
            extension: "cpp".to_string(),
            harness_source: "int main() { return 0; }".to_string(),
            memory_mb: 256,
            cpu_cores: 0.5,
            timeout: Duration::from_secs(5),
            host_root,
        }
    }

    #[test]
    fn prepare_host_dir_writes_the_harness_under_a_per_execution_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path().to_path_buf());

        let dir = prepare_host_dir(&cfg).unwrap();

        assert_eq!(
            dir,
            tmp.path().join("compiled_test_codes").join(cfg.execution_id.to_string())
        );
        assert!(dir.is_dir());

        let solution_path = dir.join("solution.cpp");
        assert_eq!(std::fs::read_to_string(&solution_path).unwrap(), cfg.harness_source);

        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o777);
    }

    #[test]
    fn prepare_host_dir_is_scoped_to_its_own_execution_id() {
        let tmp = tempfile::tempdir().unwrap();
        let first = config(tmp.path().to_path_buf());
        let second = config(tmp.path().to_path_buf());

        let first_dir = prepare_host_dir(&first).unwrap();
        let second_dir = prepare_host_dir(&second).unwrap();

        assert_ne!(first_dir, second_dir);
        assert!(first_dir.join("solution.cpp").is_file());
        assert!(second_dir.join("solution.cpp").is_file());
    }
}
