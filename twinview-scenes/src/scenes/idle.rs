use twinview::prelude::*;

pub static SCENE_CONFIG: SceneConfig = SceneConfig {
    name: "idle",
    display_name: "Idle",
};

pub fn init() -> ShaderScene {
    ShaderScene::new(SceneAssets::from_file(file!()).wgsl())
}
