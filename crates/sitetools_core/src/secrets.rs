use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;

pub const SECRET_KEYS: [&str; 6] = [
    "address",
    "ses_host",
    "ses_username",
    "ses_password",
    "isso_port",
    "isso_password",
];

/// One value per line, in `SECRET_KEYS` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Secrets {
    /// Contact address; receives comment notifications and contact form mail.
    pub address: String,
    pub ses_host: String,
    pub ses_username: String,
    pub ses_password: String,
    /// Isso listen port; must match the web server's proxy config.
    pub isso_port: String,
    pub isso_password: String,
}

impl Secrets {
    pub fn parse(content: &str) -> Result<Self> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        let mut values: [String; 6] = Default::default();
        for (index, key) in SECRET_KEYS.iter().enumerate() {
            let Some(line) = lines.get(index) else {
                bail!("secrets file is missing line {} ({key})", index + 1);
            };
            values[index] = line.to_string();
        }
        Ok(Self::from_values(values))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for value in self.values() {
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn encoded(&self) -> Self {
        Self::from_values(self.values().map(|value| BASE64.encode(value.as_bytes())))
    }

    pub fn decoded(&self) -> Result<Self> {
        self.map_values(|key, value| {
            let bytes = BASE64
                .decode(value.as_bytes())
                .with_context(|| format!("{key} is not valid base64"))?;
            String::from_utf8(bytes).with_context(|| format!("{key} is not valid UTF-8"))
        })
    }

    fn values(&self) -> [&str; 6] {
        [
            &self.address,
            &self.ses_host,
            &self.ses_username,
            &self.ses_password,
            &self.isso_port,
            &self.isso_password,
        ]
    }

    fn from_values(values: [String; 6]) -> Self {
        let [address, ses_host, ses_username, ses_password, isso_port, isso_password] = values;
        Self {
            address,
            ses_host,
            ses_username,
            ses_password,
            isso_port,
            isso_password,
        }
    }

    fn map_values<F>(&self, map: F) -> Result<Self>
    where
        F: Fn(&str, &str) -> Result<String>,
    {
        let mut mapped: [String; 6] = Default::default();
        for (index, value) in self.values().into_iter().enumerate() {
            mapped[index] = map(SECRET_KEYS[index], value)?;
        }
        Ok(Self::from_values(mapped))
    }
}

pub fn read_secrets_file(path: &Path) -> Result<Secrets> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Secrets::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_secrets_file(secrets: &Secrets, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, secrets.render()).with_context(|| format!("failed to write {}", path.display()))
}

/// Read plaintext secrets from `source`, write the base64 form to `destination`.
pub fn encode_secrets_file(source: &Path, destination: &Path) -> Result<()> {
    let secrets = read_secrets_file(source)?;
    write_secrets_file(&secrets.encoded(), destination)
}

/// Read base64 secrets from `source`, write the plaintext form to `destination`.
pub fn decode_secrets_file(source: &Path, destination: &Path) -> Result<()> {
    let secrets = read_secrets_file(source)?
        .decoded()
        .with_context(|| format!("failed to decode {}", source.display()))?;
    write_secrets_file(&secrets, destination)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IssoConfigReport {
    pub updated_keys: usize,
    pub appended_keys: usize,
}

/// Copy the Isso config at `source` to `destination` with the server, admin,
/// and SMTP settings filled in from decoded `secrets`. Other lines are kept.
pub fn insert_isso_config_secrets(
    source: &Path,
    destination: &Path,
    secrets: &Secrets,
) -> Result<IssoConfigReport> {
    let content = fs::read_to_string(source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    let mut document = IniDocument::parse(&content);
    let mut report = IssoConfigReport {
        updated_keys: 0,
        appended_keys: 0,
    };

    let settings = [
        ("server", "listen", format!("http://localhost:{}", secrets.isso_port)),
        ("admin", "password", secrets.isso_password.clone()),
        ("smtp", "username", secrets.ses_username.clone()),
        ("smtp", "password", secrets.ses_password.clone()),
        ("smtp", "host", secrets.ses_host.clone()),
        ("smtp", "to", secrets.address.clone()),
        ("smtp", "from", format!("\"Isso\" <{}>", secrets.address)),
    ];
    for (section, key, value) in &settings {
        if document.set(section, key, value) {
            report.updated_keys += 1;
        } else {
            report.appended_keys += 1;
        }
    }

    fs::write(destination, document.render())
        .with_context(|| format!("failed to write {}", destination.display()))?;
    Ok(report)
}

/// Line-preserving INI editor.
#[derive(Debug, Clone)]
struct IniDocument {
    lines: Vec<String>,
}

impl IniDocument {
    fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    /// Set `key` in `section`. Returns `true` when an existing key was
    /// replaced, `false` when it had to be appended.
    fn set(&mut self, section: &str, key: &str, value: &str) -> bool {
        let entry = format!("{key} = {value}");
        let Some(header) = self.section_index(section) else {
            if self.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{section}]"));
            self.lines.push(entry);
            return false;
        };

        let end = self.lines[header + 1..]
            .iter()
            .position(|line| section_name(line).is_some())
            .map_or(self.lines.len(), |offset| header + 1 + offset);

        for index in header + 1..end {
            if entry_key(&self.lines[index]).is_some_and(|found| found.eq_ignore_ascii_case(key)) {
                self.lines[index] = entry;
                return true;
            }
        }

        let insert_at = (header + 1..end)
            .rev()
            .find(|index| !self.lines[*index].trim().is_empty())
            .map_or(header + 1, |index| index + 1);
        self.lines.insert(insert_at, entry);
        false
    }

    fn section_index(&self, section: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| section_name(line).is_some_and(|name| name.eq_ignore_ascii_case(section)))
    }
}

fn section_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn entry_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') || line.starts_with([' ', '\t']) {
        return None;
    }
    let split = trimmed.find(['=', ':'])?;
    Some(trimmed[..split].trim())
}
