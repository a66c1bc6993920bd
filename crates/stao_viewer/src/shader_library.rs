//! Shader sources looked up by file name.
//!
//! Each configured directory is searched in order; a file found there
//! overrides the copy compiled into the binary.

use std::path::PathBuf;

use anyhow::Result;

const EMBEDDED: &[(&str, &str)] = &[("present.wgsl", include_str!("shaders/present.wgsl"))];

pub struct ShaderLibrary {
    search_paths: Vec<PathBuf>,
}

impl ShaderLibrary {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn load(&self, name: &str) -> Result<String> {
        for dir in &self.search_paths {
            let path = dir.join(name);
            if path.is_file() {
                let source = std::fs::read_to_string(&path)?;
                log::info!("Loaded shader {}", path.display());
                return Ok(source);
            }
        }
        EMBEDDED
            .iter()
            .find(|(file, _)| *file == name)
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| anyhow::anyhow!("Shader {} not found in search paths", name))
    }
}
