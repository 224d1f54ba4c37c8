// ABOUTME: Invokes the dbt CLI against the configured project
// ABOUTME: Streams dbt output through the logger and maps failures to transform errors

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::config::DbtConfig;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct DbtRunner {
    executable: PathBuf,
    project_dir: PathBuf,
    profiles_dir: PathBuf,
    target_dir: PathBuf,
    manifest_path: PathBuf,
}

impl DbtRunner {
    /// Resolve the dbt executable on `PATH` (or at an explicit path).
    ///
    /// Relative directories are resolved against the working directory here,
    /// so the target dir we create and the manifest we check are the ones dbt
    /// writes to after it is started inside the project.
    pub fn from_config(config: &DbtConfig) -> Result<Self> {
        let executable = which::which(config.executable()).map_err(|e| {
            PipelineError::Transform(format!(
                "dbt executable {} not found: {}",
                config.executable().display(),
                e
            ))
        })?;

        Ok(Self {
            executable,
            project_dir: absolute(config.project_dir()?)?,
            profiles_dir: absolute(&config.profiles_dir()?)?,
            target_dir: absolute(&config.target_dir()?)?,
            manifest_path: absolute(&config.manifest_path()?)?,
        })
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Arguments for `dbt <command>`, with project, profiles and target paths.
    pub fn command_args(&self, command: &str, select: &[String]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            command.into(),
            "--project-dir".into(),
            self.project_dir.clone().into(),
            "--profiles-dir".into(),
            self.profiles_dir.clone().into(),
        ];

        // deps does not write artifacts and rejects --target-path
        if command != "deps" {
            args.push("--target-path".into());
            args.push(self.target_dir.clone().into());
        }

        if !select.is_empty() {
            args.push("--select".into());
            args.extend(select.iter().map(OsString::from));
        }
        args
    }

    /// Run `dbt <command>`, optionally restricted to `select`.
    pub async fn run(&self, command: &str, select: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.target_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create dbt target directory {}",
                    self.target_dir.display()
                )
            })?;

        let args = self.command_args(command, select);
        tracing::debug!("Running {} {:?}", self.executable.display(), args);

        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::Transform(format!(
                    "failed to start {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(forward_lines(stdout, false), forward_lines(stderr, true));

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed waiting for dbt {}", command))?;

        if !status.success() {
            return Err(PipelineError::Transform(format!(
                "dbt {} exited with {}",
                command, status
            ))
            .into());
        }

        tracing::info!("dbt {} finished", command);
        Ok(())
    }

    /// Install packages and compile the project, regenerating the manifest.
    pub async fn compile(&self) -> Result<PathBuf> {
        self.run("deps", &[]).await?;
        self.run("compile", &[]).await?;

        if !self.manifest_path.is_file() {
            return Err(PipelineError::Manifest(format!(
                "dbt compile finished but {} was not written",
                self.manifest_path.display()
            ))
            .into());
        }

        tracing::info!("Manifest generated at: {}", self.manifest_path.display());
        Ok(self.manifest_path.clone())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve dbt path {}", path.display()))
}

/// Drain a child pipe to the log. Bytes that are not UTF-8 are replaced
/// rather than ending the read, which would leave dbt blocked on a full pipe.
async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, is_stderr: bool) {
    let Some(reader) = reader else {
        return;
    };

    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        let segment = match segments.next_segment().await {
            Ok(Some(segment)) => segment,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read dbt output: {}", e);
                break;
            }
        };
        let line = String::from_utf8_lossy(&segment);
        let line = line.trim_end_matches('\r');
        if is_stderr {
            tracing::warn!(target: "dbt", "{}", line);
        } else {
            tracing::info!(target: "dbt", "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(dir: &Path, executable: PathBuf) -> DbtRunner {
        DbtRunner {
            executable,
            project_dir: dir.to_path_buf(),
            profiles_dir: dir.join("profiles"),
            target_dir: dir.join("target"),
            manifest_path: dir.join("target").join("manifest.json"),
        }
    }

    #[test]
    fn command_args_include_paths_and_selection() {
        let runner = runner(Path::new("/srv/weather"), PathBuf::from("dbt"));
        let args = runner.command_args("build", &["stg_weather_current".to_string()]);
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "build",
                "--project-dir",
                "/srv/weather",
                "--profiles-dir",
                "/srv/weather/profiles",
                "--target-path",
                "/srv/weather/target",
                "--select",
                "stg_weather_current",
            ]
        );
    }

    #[test]
    fn deps_has_no_target_path() {
        let runner = runner(Path::new("/srv/weather"), PathBuf::from("dbt"));
        let args = runner.command_args("deps", &[]);
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn missing_executable_is_a_transform_error() {
        let config = DbtConfig {
            project_dir: Some(PathBuf::from("/srv/weather")),
            executable: Some(PathBuf::from("/nonexistent/bin/dbt")),
            ..Default::default()
        };
        let err = DbtRunner::from_config(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Transform(_))
        ));
    }

    #[cfg(unix)]
    fn fake_dbt(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-dbt");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_creates_target_dir_and_passes_args() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_dbt(dir.path(), r#"echo "$@" > "$(dirname "$0")/args.txt""#);
        let runner = runner(dir.path(), exe);

        runner.run("build", &[]).await.unwrap();

        assert!(dir.path().join("target").is_dir());
        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(args.starts_with("build --project-dir"), "got: {args}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_transform_error() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_dbt(dir.path(), "echo 'Compilation Error' >&2\nexit 2");
        let runner = runner(dir.path(), exe);

        let err = runner.run("build", &[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Transform(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_project_dir_resolves_from_the_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir_in(&cwd).unwrap();
        let relative = dir.path().strip_prefix(&cwd).unwrap().to_path_buf();
        assert!(relative.is_relative());

        // dbt is started inside the project, so every path it gets must still
        // point at the project from there.
        let exe = fake_dbt(
            dir.path(),
            r#"[ -d "$3" ] || exit 2
if [ "$1" = compile ]; then echo '{"nodes":{}}' > "$7/manifest.json"; fi"#,
        );
        let config = DbtConfig {
            project_dir: Some(relative),
            executable: Some(exe),
            ..Default::default()
        };
        let runner = DbtRunner::from_config(&config).unwrap();

        assert!(runner.project_dir.is_absolute());
        assert_eq!(runner.target_dir, dir.path().join("target"));
        assert_eq!(
            runner.manifest_path(),
            dir.path().join("target").join("manifest.json")
        );

        runner.run("build", &[]).await.unwrap();
        let manifest = runner.compile().await.unwrap();
        assert!(manifest.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_that_is_not_utf8_is_drained() {
        let dir = tempfile::tempdir().unwrap();
        // More output than a pipe buffer holds, after a line that is not UTF-8.
        let exe = fake_dbt(
            dir.path(),
            r#"printf 'bad \377 byte\r\n'
printf '\376\n' >&2
i=0
while [ $i -lt 20000 ]; do echo "model line $i"; i=$((i+1)); done
touch "$(dirname "$0")/done""#,
        );
        let runner = runner(dir.path(), exe);

        tokio::time::timeout(std::time::Duration::from_secs(60), runner.run("build", &[]))
            .await
            .expect("dbt output was not drained")
            .unwrap();
        assert!(dir.path().join("done").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compile_requires_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_dbt(dir.path(), "exit 0");
        let runner = runner(dir.path(), exe);

        let err = runner.compile().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Manifest(_))
        ));

        let exe = fake_dbt(
            dir.path(),
            r#"if [ "$1" = compile ]; then echo '{"nodes":{}}' > "$7/manifest.json"; fi"#,
        );
        let runner = DbtRunner {
            executable: exe,
            ..runner
        };
        let path = runner.compile().await.unwrap();
        assert!(path.is_file());
    }
}
