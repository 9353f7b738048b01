//! Static files embedded in the binary and copied into the sandbox.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Lima template used to create the VM.
pub const LIMA_TEMPLATE: &str = include_str!("files/lima.yaml");

/// Guest mount point of the exchange directory.
pub const GUEST_EXCHANGE_ROOT: &str = "/exchange";

/// A file provisioned into the guest.
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    /// Short name, used for temp file naming and logs.
    pub name: &'static str,
    /// Destination inside the VM. `~` is the guest user's home.
    pub guest_path: &'static str,
    pub contents: &'static str,
}

/// Files copied into the guest by provisioning.
pub const PROVISIONED_ASSETS: &[Asset] = &[
    Asset {
        name: "CLAUDE.md",
        guest_path: "~/.claude/CLAUDE.md",
        contents: include_str!("files/CLAUDE.md"),
    },
    Asset {
        name: "settings.json",
        guest_path: "~/.claude/settings.json",
        contents: include_str!("files/settings.json"),
    },
    Asset {
        name: "SKILL.md",
        guest_path: "~/.claude/skills/executing-plans/SKILL.md",
        contents: include_str!("files/executing-plans.md"),
    },
];

/// Writes `contents` to a fresh temp file. The file is removed when the
/// returned handle is dropped.
pub fn materialize(name: &str, contents: &str) -> Result<NamedTempFile> {
    let prefix = format!("cco-{}-", name.replace('.', "-"));
    let suffix = Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Guest directories that must exist before the assets can be copied,
/// as `$HOME`-relative shell words, deduplicated in first-seen order.
pub fn guest_parent_dirs(assets: &[Asset]) -> Vec<String> {
    let mut dirs: Vec<String> = Vec::new();
    for asset in assets {
        let Some((parent, _)) = asset.guest_path.rsplit_once('/') else {
            continue;
        };
        let dir = match parent.strip_prefix('~') {
            Some(rest) => format!("$HOME{}", rest),
            None => parent.to_string(),
        };
        if !dir.is_empty() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Points the template's exchange mount at `exchange_root` on the host.
pub fn render_template(template: &str, exchange_root: &Path) -> Result<String> {
    let mut doc: serde_yaml::Value =
        serde_yaml::from_str(template).map_err(|e| Error::Template(e.to_string()))?;

    let mounts = doc
        .get_mut("mounts")
        .and_then(serde_yaml::Value::as_sequence_mut)
        .ok_or_else(|| Error::Template("template has no mounts".to_string()))?;

    let exchange = mounts
        .iter_mut()
        .find(|m| m.get("mountPoint").and_then(serde_yaml::Value::as_str) == Some(GUEST_EXCHANGE_ROOT))
        .ok_or_else(|| {
            Error::Template(format!("template has no mount at {}", GUEST_EXCHANGE_ROOT))
        })?;

    let mapping = exchange
        .as_mapping_mut()
        .ok_or_else(|| Error::Template("exchange mount is not a mapping".to_string()))?;
    mapping.insert(
        serde_yaml::Value::from("location"),
        serde_yaml::Value::from(exchange_root.to_string_lossy().into_owned()),
    );

    serde_yaml::to_string(&doc).map_err(|e| Error::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_files_are_not_empty() {
        assert!(!LIMA_TEMPLATE.is_empty());
        for asset in PROVISIONED_ASSETS {
            assert!(!asset.contents.is_empty(), "{} is empty", asset.name);
        }
    }

    #[test]
    fn lima_template_mounts_exchange() {
        assert!(LIMA_TEMPLATE.contains("minimumLimaVersion"));
        assert!(LIMA_TEMPLATE.contains("ubuntu-24.04"));
        assert!(LIMA_TEMPLATE.contains("mounts:"));
        assert!(LIMA_TEMPLATE.contains("/exchange"));
    }

    #[test]
    fn settings_are_valid_json() {
        let settings = PROVISIONED_ASSETS
            .iter()
            .find(|a| a.name == "settings.json")
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(settings.contents).unwrap();
        assert_eq!(value["skipDangerousModePermissionPrompt"], true);
    }

    #[test]
    fn skill_explains_output_bundle() {
        let skill = PROVISIONED_ASSETS
            .iter()
            .find(|a| a.guest_path.ends_with("executing-plans/SKILL.md"))
            .unwrap();
        assert!(skill.contents.contains("name: executing-plans"));
        assert!(skill.contents.contains("git bundle create"));
        assert!(skill.contents.contains("/exchange/"));
    }

    #[test]
    fn materialize_writes_and_removes_on_drop() {
        let file = materialize("settings.json", "{}").unwrap();
        let path = file.path().to_path_buf();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(path.to_string_lossy().ends_with(".json"));

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn guest_parent_dirs_are_deduplicated() {
        let dirs = guest_parent_dirs(PROVISIONED_ASSETS);
        assert_eq!(dirs, ["$HOME/.claude", "$HOME/.claude/skills/executing-plans"]);
    }

    #[test]
    fn render_template_rewrites_exchange_location() {
        let rendered = render_template(LIMA_TEMPLATE, Path::new("/home/dev/.local/share/cco/exchange")).unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let mount = &doc["mounts"][0];
        assert_eq!(mount["location"].as_str(), Some("/home/dev/.local/share/cco/exchange"));
        assert_eq!(mount["mountPoint"].as_str(), Some("/exchange"));
        assert_eq!(mount["writable"].as_bool(), Some(true));
        assert!(doc["provision"].as_sequence().is_some());
    }

    #[test]
    fn render_template_requires_exchange_mount() {
        let err = render_template("cpus: 2\nmounts: []\n", Path::new("/x")).unwrap_err();
        assert!(matches!(err, Error::Template(_)));

        let err = render_template("cpus: 2\n", Path::new("/x")).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }
}
