use twinview::prelude::*;

pub static SCENE_CONFIG: SceneConfig = SceneConfig {
    name: "plasma",
    display_name: "Plasma",
};

pub fn init() -> ShaderScene {
    let assets = SceneAssets::from_file(file!());
    ShaderScene::new(assets.wgsl())
}
