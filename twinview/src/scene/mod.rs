mod registration_macros;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod scene_assets;
pub mod selector;

pub use registry::{SceneConfig, SceneEntry, SceneRegistry, ShaderScene};
pub use scene::{
    ChannelTarget, DEBUG_SCENE_NAME, DisplayChannel, EXTERNAL_APP_SCENE_NAME,
    Scene,
};
pub use scene_assets::SceneAssets;
pub use selector::{SceneSelector, SelectorOutcome, SelectorSettings};
