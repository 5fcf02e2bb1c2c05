use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

pub const GENERATOR_ENV: &str = "HUGO_PATH";
pub const CONTACT_FORM_PATH: &str = "php/contact.php";
const SECRETS_FILE_ASSIGNMENT: &str = "$secrets_file =";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_root: PathBuf,
    pub build_dir: PathBuf,
    /// Explicit generator binary; falls back to `HUGO_PATH`, then `PATH`.
    pub generator: Option<PathBuf>,
    /// Written into the contact form script when present.
    pub secrets_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generator: String,
    pub build_dir: String,
    pub removed_previous_build: bool,
    pub generator_stdout: String,
    pub contact_form_patched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub build_dir: String,
    pub deploy_dir: String,
    pub removed_existing: bool,
    pub directories_created: usize,
    pub files_copied: usize,
}

pub fn build_site(options: &BuildOptions) -> Result<BuildReport> {
    let generator = match &options.generator {
        Some(path) => path.clone(),
        None => find_generator_path().ok_or_else(|| {
            anyhow::anyhow!("hugo not found; set {GENERATOR_ENV} or add it to PATH")
        })?,
    };

    let removed_previous_build = options.build_dir.exists();
    if removed_previous_build {
        fs::remove_dir_all(&options.build_dir)
            .with_context(|| format!("failed to remove {}", options.build_dir.display()))?;
    }

    let output = Command::new(&generator)
        .current_dir(&options.project_root)
        .output()
        .with_context(|| format!("failed to execute {}", generator.display()))?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{} exited with {}: {}",
            generator.display(),
            output.status,
            stderr.trim()
        );
    }

    if options.build_dir.exists() {
        touch(&options.build_dir)?;
    }

    let contact_form_patched = match &options.secrets_file {
        Some(secrets_file) => patch_contact_form(
            &options.build_dir.join(CONTACT_FORM_PATH),
            secrets_file,
        )?,
        None => false,
    };

    Ok(BuildReport {
        generator: generator.display().to_string(),
        build_dir: options.build_dir.display().to_string(),
        removed_previous_build,
        generator_stdout: stdout.trim().to_string(),
        contact_form_patched,
    })
}

/// Point the contact form script at `secrets_file`. Returns `false` when the
/// script is absent or has no `$secrets_file` assignment.
pub fn patch_contact_form(contact_form: &Path, secrets_file: &Path) -> Result<bool> {
    if !contact_form.is_file() {
        return Ok(false);
    }
    let content = fs::read_to_string(contact_form)
        .with_context(|| format!("failed to read {}", contact_form.display()))?;

    let mut patched = false;
    let mut output = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if line.starts_with(SECRETS_FILE_ASSIGNMENT) {
            output.push_str(&format!(
                "{SECRETS_FILE_ASSIGNMENT} '{}';\n",
                secrets_file.display()
            ));
            patched = true;
        } else {
            output.push_str(line);
        }
    }

    if patched {
        fs::write(contact_form, output)
            .with_context(|| format!("failed to write {}", contact_form.display()))?;
    }
    Ok(patched)
}

pub fn deploy_site(build_dir: &Path, deploy_dir: &Path, delete_existing: bool) -> Result<DeployReport> {
    if !build_dir.is_dir() {
        bail!("build directory {} does not exist", build_dir.display());
    }

    let removed_existing = delete_existing && deploy_dir.exists();
    if removed_existing {
        fs::remove_dir_all(deploy_dir)
            .with_context(|| format!("failed to remove {}", deploy_dir.display()))?;
    }

    let mut directories_created = 0usize;
    let mut files_copied = 0usize;
    for entry in WalkDir::new(build_dir).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", build_dir.display()))?;
        let relative = entry
            .path()
            .strip_prefix(build_dir)
            .with_context(|| format!("{} is outside the build directory", entry.path().display()))?;
        let target = deploy_dir.join(relative);

        if entry.file_type().is_dir() {
            if !target.exists() {
                fs::create_dir_all(&target)
                    .with_context(|| format!("failed to create {}", target.display()))?;
                directories_created += 1;
            }
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            files_copied += 1;
        }
    }

    Ok(DeployReport {
        build_dir: build_dir.display().to_string(),
        deploy_dir: deploy_dir.display().to_string(),
        removed_existing,
        directories_created,
        files_copied,
    })
}

pub fn find_generator_path() -> Option<PathBuf> {
    if let Some(env_path) = env::var(GENERATOR_ENV)
        .ok()
        .map(|value| PathBuf::from(value.trim()))
        .filter(|path| path.exists())
    {
        return Some(env_path);
    }

    let names = if cfg!(windows) {
        vec!["hugo.exe", "hugo"]
    } else {
        vec!["hugo"]
    };

    let path_var = env::var("PATH").ok()?;
    for part in env::split_paths(&path_var) {
        if part.as_os_str().is_empty() {
            continue;
        }
        for name in &names {
            let candidate = part.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn touch(path: &Path) -> Result<()> {
    File::open(path)
        .and_then(|handle| handle.set_modified(SystemTime::now()))
        .with_context(|| format!("failed to update modification time of {}", path.display()))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn contact_form_points_at_secrets_file() {
        let temp = tempdir().expect("tempdir");
        let script = temp.path().join("contact.php");
        fs::write(
            &script,
            "<?php\n$secrets_file = '/old/path';\n$other = 1;\n",
        )
        .expect("write script");

        let patched = patch_contact_form(&script, Path::new("/srv/secrets.txt")).expect("patch");
        assert!(patched);
        assert_eq!(
            fs::read_to_string(&script).expect("read"),
            "<?php\n$secrets_file = '/srv/secrets.txt';\n$other = 1;\n"
        );
    }

    #[test]
    fn missing_contact_form_is_not_an_error() {
        let temp = tempdir().expect("tempdir");
        let patched = patch_contact_form(&temp.path().join("absent.php"), Path::new("s.txt"))
            .expect("patch");
        assert!(!patched);
    }

    #[test]
    fn deploy_copies_tree_and_replaces_existing() {
        let temp = tempdir().expect("tempdir");
        let build = temp.path().join("public");
        let deploy = temp.path().join("www");
        fs::create_dir_all(build.join("css")).expect("mkdir build");
        fs::write(build.join("index.html"), "<html></html>").expect("write index");
        fs::write(build.join("css/site.css"), "body {}").expect("write css");
        fs::create_dir_all(&deploy).expect("mkdir deploy");
        fs::write(deploy.join("stale.html"), "old").expect("write stale");

        let report = deploy_site(&build, &deploy, true).expect("deploy");
        assert!(report.removed_existing);
        assert_eq!(report.files_copied, 2);
        assert_eq!(
            fs::read_to_string(deploy.join("css/site.css")).expect("read css"),
            "body {}"
        );
        assert!(!deploy.join("stale.html").exists());
    }

    #[test]
    fn deploy_without_delete_overwrites_in_place() {
        let temp = tempdir().expect("tempdir");
        let build = temp.path().join("public");
        let deploy = temp.path().join("www");
        fs::create_dir_all(&build).expect("mkdir build");
        fs::write(build.join("index.html"), "new").expect("write index");
        fs::create_dir_all(&deploy).expect("mkdir deploy");
        fs::write(deploy.join("index.html"), "old").expect("write old");
        fs::write(deploy.join("keep.txt"), "keep").expect("write keep");

        let report = deploy_site(&build, &deploy, false).expect("deploy");
        assert!(!report.removed_existing);
        assert_eq!(report.directories_created, 0);
        assert_eq!(fs::read_to_string(deploy.join("index.html")).expect("read"), "new");
        assert!(deploy.join("keep.txt").exists());
    }

    #[test]
    fn deploy_requires_build_directory() {
        let temp = tempdir().expect("tempdir");
        let error = deploy_site(&temp.path().join("missing"), &temp.path().join("www"), false)
            .expect_err("must fail");
        assert!(error.to_string().contains("does not exist"));
    }
}
