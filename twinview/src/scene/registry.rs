use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::scene::Scene;

pub struct SceneConfig {
    pub name: &'static str,
    pub display_name: &'static str,
}

/// A generated scene is a fullscreen WGSL program. The engine never looks
/// inside it; it only compiles it and draws it into a target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShaderScene {
    shader_path: PathBuf,
}

impl ShaderScene {
    pub fn new(shader_path: impl Into<PathBuf>) -> Self {
        Self {
            shader_path: shader_path.into(),
        }
    }

    pub fn shader_path(&self) -> &Path {
        &self.shader_path
    }
}

pub struct SceneEntry {
    pub config: &'static SceneConfig,
    pub content: ShaderScene,
}

#[derive(Default)]
pub struct SceneRegistry {
    entries: HashMap<String, SceneEntry>,
    ordered_names: Vec<String>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        config: &'static SceneConfig,
        content: ShaderScene,
    ) -> Result<(), String> {
        let name = config.name.to_string();

        if !matches!(Scene::from_name(&name), Ok(Scene::Generated(_))) {
            return Err(format!("reserved scene name: '{}'", name));
        }

        if self.entries.contains_key(&name) {
            return Err(format!("duplicate scene registration: {}", name));
        }

        self.ordered_names.push(name.clone());
        self.entries.insert(name, SceneEntry { config, content });

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SceneEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn scene_names(&self) -> &[String] {
        &self.ordered_names
    }

    pub fn first_scene_name(&self) -> Option<&str> {
        self.ordered_names.first().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SceneEntry> {
        self.ordered_names
            .iter()
            .filter_map(|name| self.entries.get(name))
    }
}
