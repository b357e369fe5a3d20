//! WGSL generation and shader module caching.
//!
//! Every pipeline is generated from the `entity` template. The snippets of a
//! [`PipelineDesc`] select which chunk files under `shaders/chunks/` are
//! spliced into each hook, and the layers with
//! [`LayerCombine::Modulate`] pick which textures multiply the base color.

use std::borrow::Cow;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, context, syntax::SyntaxConfig};
use rig_core::{Result, RigError};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::pipeline::{LAYER_SHADOW_MAP, LayerCombine, PipelineDesc, SnippetHook};

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/backend/wgpu/shaders"]
struct ShaderAssets;

fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure shader template syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

/// Resolves `{$ include "name" $}` to the embedded `name.wgsl`.
fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if name.ends_with(".wgsl") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    match ShaderAssets::get(filename.as_ref()) {
        Some(file) => std::str::from_utf8(file.data.as_ref())
            .map(|source| Some(source.to_string()))
            .map_err(|e| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("'{filename}' is not UTF-8: {e}"),
                )
            }),
        None => Ok(None),
    }
}

/// Expands the entity template for `desc`.
pub fn generate(desc: &PipelineDesc) -> Result<String> {
    let chunks = |hook: SnippetHook| -> Vec<&'static str> {
        desc.snippets_for(hook).map(|s| s.chunk()).collect()
    };
    let modulate: Vec<u8> = desc
        .layers
        .iter()
        .filter(|l| l.combine == LayerCombine::Modulate && l.index != LAYER_SHADOW_MAP)
        .map(|l| l.index)
        .collect();

    let template_error = |e: Error| RigError::ShaderTemplate {
        template: desc.label.to_string(),
        reason: e.to_string(),
    };

    get_env()
        .get_template("entity")
        .map_err(template_error)?
        .render(context! {
            vertex_transform => chunks(SnippetHook::VertexTransform),
            vertex => chunks(SnippetHook::Vertex),
            fragment => chunks(SnippetHook::Fragment),
            modulate => modulate,
        })
        .map_err(template_error)
}

/// Compiled shader modules keyed by a hash of their source.
#[derive(Default)]
pub struct ShaderCache {
    modules: FxHashMap<u128, wgpu::ShaderModule>,
}

impl ShaderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates and compiles the program for `desc`, reusing the module of
    /// any earlier pipeline that expanded to the same source.
    pub fn get_or_compile(&mut self, device: &wgpu::Device, desc: &PipelineDesc) -> Result<&wgpu::ShaderModule> {
        let source = generate(desc)?;
        let hash = xxh3_128(source.as_bytes());
        Ok(self.modules.entry(hash).or_insert_with(|| {
            log::debug!("Compiling shader module for '{}'", desc.label);
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            })
        }))
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{LAYER_COLOR, LAYER_SHAPE, Snippets};
    use rig_core::TextureHandle;

    #[test]
    fn every_snippet_has_a_chunk() {
        for snippet in Snippets::new().all() {
            let name = format!("chunks/{}.wgsl", snippet.chunk());
            assert!(ShaderAssets::get(&name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn snippets_splice_into_their_hooks() {
        let snippets = Snippets::new();
        let mut desc = PipelineDesc::new("test");
        desc.add_snippet(snippets.cache_position);
        desc.add_snippet(snippets.dof_vertex);
        desc.add_snippet(snippets.dof_plain);

        let source = generate(&desc).unwrap();
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
        assert!(source.contains("dof_depth_of_field"));
        let vertex_end = source.find("fn fs_main").unwrap();
        assert!(source.find("out.blur =").unwrap() < vertex_end);
        assert!(source.rfind("color.a = in.blur").unwrap() > vertex_end);
    }

    #[test]
    fn only_modulated_layers_multiply_the_color() {
        let mut desc = PipelineDesc::new("test");
        desc.set_layer_texture(LAYER_SHAPE, TextureHandle::from_raw(0));
        desc.set_layer_texture(LAYER_COLOR, TextureHandle::from_raw(1));
        desc.set_layer_combine(LAYER_COLOR, LayerCombine::Replace);

        let source = generate(&desc).unwrap();
        assert!(source.contains("color *= sample_layer0(in.tex_coord);"));
        assert!(!source.contains("color *= sample_layer1(in.tex_coord);"));
    }
}
