//! Instruction template sent with every extraction call
//!
//! The rubric is a versioned text asset under `prompts/`, compiled into the
//! binary. A deployment can point `extraction.prompt_path` at a newer rubric
//! without touching orchestration code.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

const BUILTIN_VERSION: &str = "id_document_fields_v1";
const BUILTIN_TEXT: &str = include_str!("../../prompts/id_document_fields_v1.txt");

/// Field-extraction rubric plus the version label it is logged under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate {
    version: Cow<'static, str>,
    text: Cow<'static, str>,
}

impl InstructionTemplate {
    /// The rubric shipped with this build
    pub fn builtin() -> Self {
        Self {
            version: Cow::Borrowed(BUILTIN_VERSION),
            text: Cow::Borrowed(BUILTIN_TEXT),
        }
    }

    /// Load a rubric from disk; the file stem becomes the version label
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instruction template {:?}", path))?;
        if text.trim().is_empty() {
            anyhow::bail!("Instruction template {:?} is empty", path);
        }
        let version = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        Ok(Self {
            version: Cow::Owned(version),
            text: Cow::Owned(text),
        })
    }

    /// Use `path` when given, otherwise the builtin rubric
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for InstructionTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::fields::FIELD_NAMES;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_mentions_every_field() {
        let template = InstructionTemplate::builtin();
        assert_eq!(template.version(), "id_document_fields_v1");
        for key in FIELD_NAMES {
            assert!(template.text().contains(&format!("\"{}\"", key)), "missing {}", key);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Return JSON.").unwrap();

        let template = InstructionTemplate::load(Some(file.path())).unwrap();
        assert_eq!(template.text().trim(), "Return JSON.");
        assert_ne!(template.version(), BUILTIN_VERSION);
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        assert!(InstructionTemplate::from_file(file.path()).is_err());
    }

    #[test]
    fn test_load_without_path_is_builtin() {
        assert_eq!(InstructionTemplate::load(None).unwrap(), InstructionTemplate::builtin());
    }
}
