use std::env;
use std::path::{Path, PathBuf};

/// Finds files that sit beside a scene module, e.g. `scenes/idle.rs`
/// pairs with `scenes/idle.wgsl`. Pass `file!()` from the scene module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SceneAssets {
    dir: PathBuf,
    name: String,
}

impl SceneAssets {
    pub fn from_file(source_file: &str) -> Self {
        let source = locate_source(Path::new(source_file));

        Self {
            dir: source.parent().map(Path::to_path_buf).unwrap_or_default(),
            name: source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Same directory, different base name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sibling(&self, extension: &str) -> PathBuf {
        self.dir.join(&self.name).with_extension(extension)
    }

    pub fn wgsl(&self) -> PathBuf {
        self.sibling("wgsl")
    }
}

// `file!()` is relative to whatever directory cargo invoked rustc from,
// usually the workspace root. Walk up from the current directory until the
// file exists so the binary also runs from a member directory.
fn locate_source(source: &Path) -> PathBuf {
    if source.is_absolute() {
        return source.to_path_buf();
    }

    let Ok(cwd) = env::current_dir() else {
        return source.to_path_buf();
    };

    cwd.ancestors()
        .map(|dir| dir.join(source))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| cwd.join(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_shader_with_source() {
        let assets = SceneAssets::from_file("src/scenes/idle.rs");
        assert!(assets.wgsl().ends_with("src/scenes/idle.wgsl"));
        assert!(assets.dir().ends_with("src/scenes"));
        assert!(assets.sibling("yaml").ends_with("src/scenes/idle.yaml"));
    }

    #[test]
    fn renamed_keeps_directory() {
        let assets =
            SceneAssets::from_file("/opt/scenes/plasma.rs").renamed("plasma_hd");
        assert_eq!(assets.wgsl(), PathBuf::from("/opt/scenes/plasma_hd.wgsl"));
    }

    #[test]
    fn finds_existing_files_from_a_parent_directory() {
        // Tests run from the crate directory; this file lives below it.
        let assets = SceneAssets::from_file("twinview/src/scene/scene_assets.rs");
        assert!(assets.sibling("rs").exists());
    }
}
