/// Builds a [`SceneRegistry`](crate::scene::registry::SceneRegistry) from
/// scene modules. Each module exposes `SCENE_CONFIG` and an `init()` that
/// returns a [`ShaderScene`](crate::scene::registry::ShaderScene).
#[macro_export]
macro_rules! register_scenes {
    ($($module:ident),+ $(,)?) => {{
        (|| -> Result<$crate::scene::registry::SceneRegistry, String> {
            let mut __registry =
                $crate::scene::registry::SceneRegistry::new();

            $(
                __registry.register(
                    &$module::SCENE_CONFIG,
                    $module::init(),
                )?;
            )+

            Ok(__registry)
        })()
    }};
}
