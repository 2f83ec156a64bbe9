//! A project directory: `project.toml` plus the GLSL and media files it names.
//!
//! `Project::load` parses and validates the manifest and checks that every
//! referenced file exists, reporting all problems in one `Validation` error.
//! Pass sources are read on demand so a reload picks up edits.
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::{InputSource, PassEntry, ProjectManifest};

pub const MANIFEST_FILE: &str = "project.toml";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("manifest validation failed:\n  {}", .0.join("\n  "))]
    Validation(Vec<String>),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A pass ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSource {
    pub name: String,
    pub channel: u8,
    pub size: Option<[u32; 2]>,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    manifest: ProjectManifest,
}

impl Project {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(ProjectError::ManifestMissing(manifest_path));
        }

        let manifest_raw = read(&manifest_path)?;
        let manifest: ProjectManifest = toml::from_str(&manifest_raw)?;
        let mut issues = manifest.validate();
        issues.extend(missing_files(&root, &manifest));
        if !issues.is_empty() {
            return Err(ProjectError::Validation(issues));
        }

        tracing::debug!(
            root = %root.display(),
            passes = manifest.passes.len(),
            inputs = manifest.inputs.len(),
            "loaded project manifest"
        );
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        self.manifest
            .name
            .as_deref()
            .or_else(|| self.root.file_name().and_then(|name| name.to_str()))
            .unwrap_or("project")
    }

    pub fn asset_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Contents of the common fragment, or an empty string when none is declared.
    pub fn common_source(&self) -> Result<String, ProjectError> {
        match &self.manifest.common {
            Some(path) => read(&self.root.join(path)),
            None => Ok(String::new()),
        }
    }

    /// Every pass with its channel and code, buffers first and the image pass last.
    pub fn pass_sources(&self) -> Result<Vec<PassSource>, ProjectError> {
        self.manifest
            .channel_plan()
            .into_iter()
            .map(|planned| {
                Ok(PassSource {
                    name: planned.entry.name.clone(),
                    channel: planned.channel,
                    size: planned.entry.size,
                    code: read(&self.root.join(&planned.entry.source))?,
                })
            })
            .collect()
    }

    pub fn pass(&self, name: &str) -> Option<&PassEntry> {
        self.manifest.passes.iter().find(|pass| pass.name == name)
    }
}

fn read(path: &Path) -> Result<String, ProjectError> {
    fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn missing_files(root: &Path, manifest: &ProjectManifest) -> Vec<String> {
    let mut referenced: Vec<&Path> = manifest
        .passes
        .iter()
        .map(|pass| pass.source.as_path())
        .collect();
    referenced.extend(manifest.common.as_deref());
    for input in &manifest.inputs {
        match &input.source {
            InputSource::Image { path } | InputSource::Volume { path, .. } => {
                referenced.push(path.as_path())
            }
            InputSource::Video { .. } | InputSource::Audio { .. } | InputSource::Keyboard => {}
        }
    }
    referenced
        .into_iter()
        .filter(|path| !root.join(path).is_file())
        .map(|path| format!("missing file: {}", root.join(path).display()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project(dir: &Path, manifest: &str, files: &[(&str, &str)]) {
        fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
        for (path, contents) in files {
            let full_path = dir.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).expect("create dirs");
            }
            fs::write(full_path, contents).expect("write file");
        }
    }

    const MANIFEST: &str = r#"
name = "Feedback"
common = "common.glsl"

[[passes]]
name = "Image"
source = "image.glsl"

[[passes]]
name = "Buffer A"
kind = "buffer"
source = "shaders/a.glsl"
"#;

    #[test]
    fn loads_sources_in_channel_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_project(
            temp.path(),
            MANIFEST,
            &[
                ("common.glsl", "float k = 1.0;"),
                ("image.glsl", "// image"),
                ("shaders/a.glsl", "// buffer"),
            ],
        );

        let project = Project::load(temp.path()).expect("load project");
        assert_eq!(project.name(), "Feedback");
        assert_eq!(project.common_source().expect("common"), "float k = 1.0;");
        let sources = project.pass_sources().expect("sources");
        let order: Vec<(u8, &str)> = sources
            .iter()
            .map(|pass| (pass.channel, pass.code.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "// buffer"), (0, "// image")]);
    }

    #[test]
    fn missing_manifest_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            Project::load(temp.path()),
            Err(ProjectError::ManifestMissing(_))
        ));
    }

    #[test]
    fn missing_files_join_manifest_issues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manifest = format!("{MANIFEST}\n[[inputs]]\nchannel = 1\ntype = \"keyboard\"\n");
        write_project(temp.path(), &manifest, &[("image.glsl", "// image")]);

        let Err(ProjectError::Validation(issues)) = Project::load(temp.path()) else {
            panic!("expected validation failure");
        };
        assert!(issues.iter().any(|issue| issue.contains("input on channel 1")));
        assert!(issues.iter().any(|issue| issue.contains("common.glsl")));
        assert!(issues.iter().any(|issue| issue.contains("a.glsl")));
        assert!(!issues.iter().any(|issue| issue.contains("image.glsl")));
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_project(temp.path(), "[[passes]]\nname = 3\n", &[]);
        assert!(matches!(
            Project::load(temp.path()),
            Err(ProjectError::ManifestParse(_))
        ));
    }
}
