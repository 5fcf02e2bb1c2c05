use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::hyperlink::SiteDomain;
use crate::reformat::FormatOptions;
use crate::runtime::ResolvedPaths;
use crate::wrap::DEFAULT_MAX_WIDTH;

pub const DEFAULT_ISSO_SOURCE: &str = "isso.cfg.nosecrets";
pub const DEFAULT_ISSO_DESTINATION: &str = "isso.cfg";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub isso: IssoSection,
    #[serde(default)]
    pub deploy: DeploySection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub domain: Option<String>,
    pub max_line_len: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    pub posts_dir: Option<PathBuf>,
    pub comments_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct IssoSection {
    pub src: Option<PathBuf>,
    pub dst: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DeploySection {
    pub dir: Option<PathBuf>,
    pub hugo: Option<PathBuf>,
}

impl SiteConfig {
    /// Site domain: env SITE_DOMAIN > config > None.
    pub fn domain(&self) -> Option<String> {
        self.domain_with(|key| env::var(key).ok())
    }

    /// Wrap width: env SITE_MAX_LINE_LEN > config > 80.
    pub fn max_line_len(&self) -> Result<usize> {
        self.max_line_len_with(|key| env::var(key).ok())
    }

    /// Explicit generator binary: env HUGO_PATH > config > None (search PATH).
    pub fn generator(&self) -> Option<PathBuf> {
        self.generator_with(|key| env::var(key).ok())
    }

    pub fn posts_dir(&self, paths: &ResolvedPaths) -> PathBuf {
        match &self.paths.posts_dir {
            Some(dir) => absolutize_from_project(dir, &paths.project_root),
            None => paths.posts_dir.clone(),
        }
    }

    pub fn comments_db(&self, paths: &ResolvedPaths) -> PathBuf {
        match &self.paths.comments_db {
            Some(db) => absolutize_from_project(db, &paths.project_root),
            None => paths.db_path.clone(),
        }
    }

    pub fn isso_src(&self, paths: &ResolvedPaths) -> PathBuf {
        let src = self.isso.src.as_deref().unwrap_or(Path::new(DEFAULT_ISSO_SOURCE));
        absolutize_from_project(src, &paths.project_root)
    }

    pub fn isso_dst(&self, paths: &ResolvedPaths) -> PathBuf {
        let dst = self
            .isso
            .dst
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_ISSO_DESTINATION));
        absolutize_from_project(dst, &paths.project_root)
    }

    pub fn deploy_dir(&self, paths: &ResolvedPaths) -> Option<PathBuf> {
        self.deploy
            .dir
            .as_deref()
            .map(|dir| absolutize_from_project(dir, &paths.project_root))
    }

    pub fn format_options(&self) -> Result<FormatOptions> {
        Ok(FormatOptions {
            max_line_len: self.max_line_len()?,
            site: self.domain().as_deref().and_then(SiteDomain::new),
        })
    }

    fn domain_with<F>(&self, lookup_env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = non_empty_env(&lookup_env, "SITE_DOMAIN") {
            return Some(value);
        }
        self.site
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn max_line_len_with<F>(&self, lookup_env: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = non_empty_env(&lookup_env, "SITE_MAX_LINE_LEN") {
            return value
                .parse::<usize>()
                .with_context(|| format!("SITE_MAX_LINE_LEN must be a positive integer, got {value:?}"));
        }
        Ok(self.site.max_line_len.unwrap_or(DEFAULT_MAX_WIDTH))
    }

    fn generator_with<F>(&self, lookup_env: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty_env(&lookup_env, "HUGO_PATH")
            .map(PathBuf::from)
            .or_else(|| self.deploy.hugo.clone())
    }
}

fn non_empty_env<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn absolutize_from_project(path: &Path, project_root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

/// Load and parse a SiteConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_domain() {
        let config = SiteConfig::default();
        assert!(config.domain_with(|_| None).is_none());
        assert_eq!(config.max_line_len_with(|_| None).expect("width"), 80);
        assert!(config.generator_with(|_| None).is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[site]
domain = "nrsyed.com"
max_line_len = 72

[paths]
posts_dir = "content/posts"
comments_db = "/srv/isso/comments.db"

[isso]
src = "deploy/isso.cfg.nosecrets"

[deploy]
dir = "/var/www/site"
hugo = "/opt/hugo/bin/hugo"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.domain_with(|_| None).as_deref(), Some("nrsyed.com"));
        assert_eq!(config.max_line_len_with(|_| None).expect("width"), 72);
        assert_eq!(
            config.paths.posts_dir.as_deref(),
            Some(Path::new("content/posts"))
        );
        assert_eq!(
            config.generator_with(|_| None),
            Some(PathBuf::from("/opt/hugo/bin/hugo"))
        );
        assert!(config.isso.dst.is_none());
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[deploy]\ndir = \"/srv/www\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.site.domain.is_none());
        assert_eq!(config.deploy.dir.as_deref(), Some(Path::new("/srv/www")));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[site\ndomain = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn env_overrides_config_values() {
        let config = SiteConfig {
            site: SiteSection {
                domain: Some("old.example".to_string()),
                max_line_len: Some(100),
            },
            ..SiteConfig::default()
        };
        let env = HashMap::from([
            ("SITE_DOMAIN".to_string(), " new.example ".to_string()),
            ("SITE_MAX_LINE_LEN".to_string(), "60".to_string()),
            ("HUGO_PATH".to_string(), "/usr/local/bin/hugo".to_string()),
        ]);
        let lookup = |key: &str| env.get(key).cloned();

        assert_eq!(config.domain_with(lookup).as_deref(), Some("new.example"));
        assert_eq!(config.max_line_len_with(lookup).expect("width"), 60);
        assert_eq!(
            config.generator_with(lookup),
            Some(PathBuf::from("/usr/local/bin/hugo"))
        );
    }

    #[test]
    fn invalid_width_override_is_an_error() {
        let config = SiteConfig::default();
        let error = config
            .max_line_len_with(|_| Some("wide".to_string()))
            .expect_err("must fail");
        assert!(error.to_string().contains("SITE_MAX_LINE_LEN"));
    }

    #[test]
    fn blank_env_values_fall_back_to_config() {
        let config = SiteConfig {
            site: SiteSection {
                domain: Some("example.com".to_string()),
                max_line_len: None,
            },
            ..SiteConfig::default()
        };
        assert_eq!(
            config.domain_with(|_| Some("  ".to_string())).as_deref(),
            Some("example.com")
        );
    }
}
