//! Language registry: how to compile and run each supported language
//!
//! Languages are plain data loaded from TOML. Adding a language means adding
//! a table to `files/languages.toml` (or the file named by `LANGUAGES_CONFIG`);
//! nothing else in the engine changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::core::ExecutionLimits;
use crate::error::{JudgeError, JudgeResult};
use crate::runner::CommandSpec;

const BUILTIN_LANGUAGES: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/files/languages.toml"
));

const DEFAULT_BINARY_FILE: &str = "main";

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical (lowercase) language name
    pub name: String,
    /// Name of the source file (e.g., "main.c")
    pub source_file: String,
    /// Name of the compiled artifact, for compiled languages
    pub binary_file: String,
    /// Compile command template (None if not needed)
    pub compile_command: Option<Vec<String>>,
    /// Run command template
    pub run_command: Vec<String>,
    /// Time limit multiplier and bonus: (multiplier, bonus_seconds)
    /// actual_time = base_time * multiplier + bonus
    pub time_limit: Option<(u32, u32)>,
    /// Memory limit multiplier and bonus: (multiplier, bonus_mb)
    /// actual_memory = base_memory * multiplier + bonus
    pub memory_limit: Option<(u32, u32)>,
}

impl LanguageConfig {
    pub fn needs_compilation(&self) -> bool {
        self.compile_command.is_some()
    }

    pub fn source_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.source_file)
    }

    pub fn binary_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.binary_file)
    }

    /// The file handed to `run_command`: the binary for compiled languages,
    /// the source otherwise
    pub fn run_target(&self, work_dir: &Path) -> PathBuf {
        if self.needs_compilation() {
            self.binary_path(work_dir)
        } else {
            self.source_path(work_dir)
        }
    }

    /// Build the compile command, or None for interpreted languages
    pub fn compile_command(&self, source_path: &Path, output_path: &Path) -> Option<CommandSpec> {
        self.compile_command.as_ref().map(|template| {
            let parts: Vec<String> = template
                .iter()
                .map(|part| {
                    part.replace("{source}", &source_path.to_string_lossy())
                        .replace("{binary}", &output_path.to_string_lossy())
                })
                .collect();
            CommandSpec::from_vec(&parts)
        })
    }

    /// Build the run command. Both `{source}` and `{binary}` placeholders
    /// resolve to `target`.
    pub fn run_command(&self, target: &Path) -> CommandSpec {
        let target = target.to_string_lossy();
        let parts: Vec<String> = self
            .run_command
            .iter()
            .map(|part| {
                part.replace("{source}", &target)
                    .replace("{binary}", &target)
            })
            .collect();
        CommandSpec::from_vec(&parts)
    }

    /// Calculate actual time limit based on base time limit (ms)
    pub fn calculate_time_limit(&self, base_time_ms: u32) -> u32 {
        match self.time_limit {
            Some((multiplier, bonus_seconds)) => base_time_ms
                .saturating_mul(multiplier)
                .saturating_add(bonus_seconds.saturating_mul(1000)),
            None => base_time_ms,
        }
    }

    /// Calculate actual memory limit based on base memory limit (MB)
    pub fn calculate_memory_limit(&self, base_memory_mb: u32) -> u32 {
        match self.memory_limit {
            Some((multiplier, bonus_mb)) => base_memory_mb
                .saturating_mul(multiplier)
                .saturating_add(bonus_mb),
            None => base_memory_mb,
        }
    }

    /// Limits actually applied to this language's processes
    pub fn adjust_limits(&self, limits: &ExecutionLimits) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.calculate_time_limit(limits.time_limit_ms).max(1),
            memory_limit_mb: self.calculate_memory_limit(limits.memory_limit_mb).max(1),
        }
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    binary_file: Option<String>,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default)]
    time_limit: Vec<u32>,
    #[serde(default)]
    memory_limit: Vec<u32>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Read-only lookup table from language name (or alias) to its config.
/// Shared between concurrent judgings without locking.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: HashMap<String, LanguageConfig>,
    canonical: Vec<String>,
}

impl LanguageRegistry {
    /// Registry compiled into the binary (C, JavaScript, PHP)
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_LANGUAGES).context("Invalid built-in language table")
    }

    /// Load from a TOML file on disk
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid language config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut languages = HashMap::new();
        let mut canonical = Vec::with_capacity(raw_configs.len());

        for (name, raw) in raw_configs {
            let parse_limit = |raw_limit: &[u32], kind: &str| -> anyhow::Result<Option<(u32, u32)>> {
                match raw_limit {
                    [] => Ok(None),
                    [multiplier, bonus] => Ok(Some((*multiplier, *bonus))),
                    _ => anyhow::bail!("Invalid {} limit for {}: {:?}", kind, name, raw_limit),
                }
            };

            let run_command = into_command(&raw.run_command);
            if run_command.is_empty() {
                anyhow::bail!("Empty run_command for {}", name);
            }

            let name = name.to_lowercase();
            let config = LanguageConfig {
                name: name.clone(),
                source_file: raw.source_file,
                binary_file: raw
                    .binary_file
                    .unwrap_or_else(|| DEFAULT_BINARY_FILE.to_string()),
                compile_command: raw
                    .compile_command
                    .map(|cmd| into_command(&cmd))
                    .filter(|cmd| !cmd.is_empty()),
                run_command,
                time_limit: parse_limit(&raw.time_limit, "time")?,
                memory_limit: parse_limit(&raw.memory_limit, "memory")?,
            };

            for alias in raw.aliases {
                languages.insert(alias.to_lowercase(), config.clone());
            }
            languages.insert(name.clone(), config);
            canonical.push(name);
        }

        canonical.sort();
        Ok(Self {
            languages,
            canonical,
        })
    }

    /// Look up a language by name or alias (case-insensitive)
    pub fn resolve(&self, language: &str) -> JudgeResult<&LanguageConfig> {
        self.languages
            .get(&language.trim().to_lowercase())
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }

    /// Canonical names of all supported languages, sorted
    pub fn supported_languages(&self) -> &[String] {
        &self.canonical
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_CONFIG: &str = r#"
[c]
source_file = "main.c"
binary_file = "prog"
compile_command = "gcc {source} -o {binary}"
run_command = "{binary}"
time_limit = [2, 1]

[python]
source_file = "main.py"
run_command = "python3 {source}"
memory_limit = [1, 32]
aliases = ["py", "Python3"]
"#;

    #[test]
    fn test_builtin_languages() {
        let registry = LanguageRegistry::builtin().unwrap();
        assert_eq!(registry.supported_languages(), ["c", "javascript", "php"]);
        assert!(registry.resolve("C").unwrap().needs_compilation());
        assert!(!registry.resolve("JavaScript").unwrap().needs_compilation());
        assert!(!registry.resolve("PHP").unwrap().needs_compilation());
    }

    #[test]
    fn test_resolve_aliases_case_insensitive() {
        let registry = LanguageRegistry::from_toml_str(TEST_CONFIG).unwrap();
        assert_eq!(registry.resolve("PY").unwrap().name, "python");
        assert_eq!(registry.resolve("python3").unwrap().name, "python");
    }

    #[test]
    fn test_unknown_language_is_error() {
        let registry = LanguageRegistry::from_toml_str(TEST_CONFIG).unwrap();
        match registry.resolve("cobol") {
            Err(JudgeError::UnsupportedLanguage(lang)) => assert_eq!(lang, "cobol"),
            other => panic!("unexpected: {:?}", other.map(|l| l.name.clone())),
        }
    }

    #[test]
    fn test_command_templates() {
        let registry = LanguageRegistry::from_toml_str(TEST_CONFIG).unwrap();
        let work_dir = Path::new("/work");

        let c = registry.resolve("c").unwrap();
        let compile = c
            .compile_command(&c.source_path(work_dir), &c.binary_path(work_dir))
            .unwrap();
        assert_eq!(
            compile.to_vec(),
            vec!["gcc", "/work/main.c", "-o", "/work/prog"]
        );
        assert_eq!(c.run_command(&c.run_target(work_dir)).to_vec(), vec!["/work/prog"]);

        let py = registry.resolve("python").unwrap();
        assert!(py.compile_command(Path::new("a"), Path::new("b")).is_none());
        assert_eq!(
            py.run_command(&py.run_target(work_dir)).to_vec(),
            vec!["python3", "/work/main.py"]
        );
    }

    #[test]
    fn test_limit_adjustment() {
        let registry = LanguageRegistry::from_toml_str(TEST_CONFIG).unwrap();
        let base = ExecutionLimits::new(1000, 128).unwrap();

        let c = registry.resolve("c").unwrap().adjust_limits(&base);
        assert_eq!(c.time_limit_ms, 3000);
        assert_eq!(c.memory_limit_mb, 128);

        let py = registry.resolve("py").unwrap().adjust_limits(&base);
        assert_eq!(py.time_limit_ms, 1000);
        assert_eq!(py.memory_limit_mb, 160);
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let content = r#"
[c]
source_file = "main.c"
run_command = "./main"
time_limit = [1, 2, 3]
"#;
        assert!(LanguageRegistry::from_toml_str(content).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", TEST_CONFIG).unwrap();

        let registry = LanguageRegistry::from_file(file.path()).unwrap();
        assert_eq!(registry.supported_languages(), ["c", "python"]);
    }
}
