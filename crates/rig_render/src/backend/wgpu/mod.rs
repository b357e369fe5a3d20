//! wgpu Backend
//!
//! Implements [`RenderDevice`] on top of a `wgpu::Device`.
//!
//! # Layout
//!
//! Every program shares one pipeline layout:
//!
//! - **group 0**: the pipeline's [`UniformBlock`], bound with a dynamic
//!   offset into one per-target uniform buffer;
//! - **group 1**: a linear sampler followed by one texture per layer slot,
//!   in [`LAYER_SLOTS`] order. Unused slots are filled with a white texture
//!   (a depth texture cleared to the far plane for the shadow slot).
//!
//! Draws are queued between `begin_target` and `end_target` and encoded into
//! a single render pass when the target ends. Each queued draw snapshots its
//! pipeline's uniforms, so a pipeline drawn several times with different
//! uniform values (hair shells) renders each draw with its own values.
//!
//! The main framebuffer is an offscreen target owned by the device; embedders
//! copy or present [`WgpuDevice::main_texture`].
//!
//! Pipelines, textures, primitives and targets live in `SlotMap`s and their
//! handles carry the slot key, so released slots are reused and a stale
//! handle never resolves to the object that took its slot.

mod shader;

pub use shader::{ShaderCache, generate as generate_shader};

use glam::{Mat4, Vec2, Vec3, Vec4};
use rig_core::math::GL_TO_ZERO_ONE_DEPTH;
use rig_core::{PipelineHandle, PrimitiveHandle, Result, RigError, TargetHandle, TextureHandle};
use rig_scene::{Mesh, Vertex, Viewport};
use rustc_hash::FxHashMap;
use slotmap::{Key, KeyData, SlotMap, new_key_type};
use wgpu::util::DeviceExt;

use crate::device::{Rect, RenderDevice, TargetFrame};
use crate::pipeline::{BlendMode, ColorMask, LAYER_SHADOW_MAP, LAYER_SLOTS, PipelineDesc, ProgramKey};
use crate::uniforms::{Uniform, UniformBlock, UniformValue};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Size of the WGSL `Uniforms` struct. The Rust block's tail padding is not
/// declared in the shader.
const UNIFORM_BINDING_SIZE: u64 = 416;
const MIN_UNIFORM_CAPACITY: usize = 64;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    0 => Float32x3, // position
    1 => Float32x3, // normal
    2 => Float32x3, // tangent
    3 => Float32x2, // tex_coord
    4 => Float32x2, // cell_xy
    5 => Float32x4, // cell_st
];

/// Position of [`LAYER_SHADOW_MAP`] within [`LAYER_SLOTS`]; its binding
/// is a depth texture.
const SHADOW_SLOT: usize = 4;

fn slot_of(layer: u8) -> Option<usize> {
    LAYER_SLOTS.iter().position(|&l| l == layer)
}

new_key_type! {
    struct PipelineKey;
    struct TextureKey;
    struct PrimitiveKey;
    struct TargetKey;
}

macro_rules! handle_key {
    ($handle:ty => $key:ty) => {
        impl From<$handle> for $key {
            #[inline]
            fn from(handle: $handle) -> Self {
                KeyData::from_ffi(handle.raw()).into()
            }
        }

        impl From<$key> for $handle {
            #[inline]
            fn from(key: $key) -> Self {
                <$handle>::from_raw(key.data().as_ffi())
            }
        }
    };
}

handle_key!(PipelineHandle => PipelineKey);
handle_key!(TextureHandle => TextureKey);
handle_key!(PrimitiveHandle => PrimitiveKey);
handle_key!(TargetHandle => TargetKey);

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

struct GpuPrimitive {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

#[derive(Clone, Copy)]
struct GpuTarget {
    color: TextureHandle,
    depth: TextureHandle,
    width: u32,
    height: u32,
}

struct GpuPipeline {
    program: usize,
    layers: [Option<TextureHandle>; LAYER_SLOTS.len()],
    uniforms: UniformBlock,
}

type BindKey = [TextureKey; LAYER_SLOTS.len()];

struct QueuedDraw {
    program: usize,
    bind_key: BindKey,
    primitive: PrimitiveHandle,
}

struct Recording {
    target: TargetHandle,
    viewport: Viewport,
    projection: Mat4,
    clear: Option<Vec4>,
    draws: Vec<QueuedDraw>,
    uniforms: Vec<UniformBlock>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,

    shaders: ShaderCache,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    programs: Vec<wgpu::RenderPipeline>,
    program_index: FxHashMap<ProgramKey, usize>,
    pipelines: SlotMap<PipelineKey, GpuPipeline>,
    textures: SlotMap<TextureKey, GpuTexture>,
    primitives: SlotMap<PrimitiveKey, GpuPrimitive>,
    targets: SlotMap<TargetKey, GpuTarget>,
    /// Layer bind groups; evicted when any texture they name is released.
    bind_groups: FxHashMap<BindKey, wgpu::BindGroup>,

    uniform_buffer: wgpu::Buffer,
    uniform_capacity: usize,
    uniform_bind_group: wgpu::BindGroup,

    white: TextureHandle,
    far_depth: TextureHandle,
    rect: PrimitiveHandle,
    main_target: TargetHandle,

    recording: Option<Recording>,
    modelview: Mat4,
}

impl WgpuDevice {
    /// Requests an adapter and device and allocates a `width` x `height`
    /// main framebuffer.
    pub async fn request(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RigError::AdapterRequestFailed(e.to_string()))?;

        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Rig Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| RigError::DeviceCreateFailed(e.to_string()))?;

        Self::from_device(device, queue, width, height)
    }

    /// Blocking variant of [`request`](Self::request).
    pub fn request_blocking(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::request(width, height))
    }

    /// Wraps an existing device, e.g. one shared with a windowing layer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Result<Self> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Entity Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_BINDING_SIZE),
                },
                count: None,
            }],
        });

        let mut texture_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        for slot in 0..LAYER_SLOTS.len() {
            let sample_type = if slot == SHADOW_SLOT {
                wgpu::TextureSampleType::Depth
            } else {
                wgpu::TextureSampleType::Float { filterable: true }
            };
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot as u32 + 1,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Entity Layers Layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Entity Pipeline Layout"),
            bind_group_layouts: &[Some(&uniform_layout), Some(&texture_layout)],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Layer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let (uniform_buffer, uniform_bind_group) =
            create_uniform_buffer(&device, &uniform_layout, MIN_UNIFORM_CAPACITY);

        let mut this = Self {
            device,
            queue,
            shaders: ShaderCache::new(),
            pipeline_layout,
            uniform_layout,
            texture_layout,
            sampler,
            programs: Vec::new(),
            program_index: FxHashMap::default(),
            pipelines: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            primitives: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            bind_groups: FxHashMap::default(),
            uniform_buffer,
            uniform_capacity: MIN_UNIFORM_CAPACITY,
            uniform_bind_group,
            white: TextureKey::null().into(),
            far_depth: TextureKey::null().into(),
            rect: PrimitiveKey::null().into(),
            main_target: TargetKey::null().into(),
            recording: None,
            modelview: Mat4::IDENTITY,
        };

        this.white = this.create_texture_rgba8("White", 1, 1, &[255; 4])?;
        this.far_depth = this.create_far_depth();
        this.rect = this.create_primitive(&Mesh::rectangle(-1.0, -1.0, 1.0, 1.0))?;
        this.main_target = this.create_target("Main", width, height)?;

        Ok(this)
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color attachment of the main framebuffer.
    #[must_use]
    pub fn main_texture(&self) -> Option<&wgpu::Texture> {
        let target = self.target(self.main_target)?;
        self.texture(target.color).map(|t| &t.texture)
    }

    #[must_use]
    pub fn main_size(&self) -> (u32, u32) {
        self.target(self.main_target)
            .map_or((0, 0), |t| (t.width, t.height))
    }

    /// Reallocates the main framebuffer.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.main_size() == (width, height) {
            return Ok(());
        }
        let old = self.main_target;
        self.main_target = self.create_target("Main", width, height)?;
        self.release_target(old);
        Ok(())
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    fn target(&self, target: TargetHandle) -> Option<GpuTarget> {
        self.targets.get(target.into()).copied()
    }

    fn texture(&self, texture: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(texture.into())
    }

    fn pipeline_mut(&mut self, pipeline: PipelineHandle) -> Option<&mut GpuPipeline> {
        self.pipelines.get_mut(pipeline.into())
    }

    fn push_texture(&mut self, texture: wgpu::Texture, format: wgpu::TextureFormat) -> TextureHandle {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures
            .insert(GpuTexture {
                texture,
                view,
                format,
            })
            .into()
    }

    /// Drops `released` textures and every bind group that samples one.
    fn remove_textures(&mut self, released: &[TextureKey]) {
        for &key in released {
            self.textures.remove(key);
        }
        let evicted = evict_bind_groups(&mut self.bind_groups, released);
        if evicted > 0 {
            log::trace!("Evicted {evicted} layer bind groups");
        }
    }

    fn create_far_depth(&mut self) -> TextureHandle {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Far Depth"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let handle = self.push_texture(texture, DEPTH_FORMAT);

        if let Some(gpu) = self.texture(handle) {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Clear Far Depth"),
                });
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Far Depth"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        handle
    }

    fn build_program(&mut self, desc: &PipelineDesc) -> Result<wgpu::RenderPipeline> {
        let module = self.shaders.get_or_compile(&self.device, desc)?;

        let blend = match desc.blend {
            BlendMode::Premultiplied => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendMode::Replace => wgpu::BlendState::REPLACE,
        };
        // GL semantics: depth writes are off whenever the test is off.
        let (depth_write_enabled, depth_compare) = if desc.depth.test {
            (desc.depth.write, wgpu::CompareFunction::Less)
        } else {
            (false, wgpu::CompareFunction::Always)
        };

        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }];

        Ok(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(blend),
                    write_mask: color_writes(desc.color_mask),
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: Some(depth_write_enabled),
                depth_compare: Some(depth_compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        }))
    }

    /// Texture bound in `slot` for `layers`, falling back to the dummies for
    /// empty, released or wrongly formatted textures.
    fn bind_key(&self, layers: &[Option<TextureHandle>; LAYER_SLOTS.len()]) -> BindKey {
        let mut key = [TextureKey::null(); LAYER_SLOTS.len()];
        for (slot, layer) in layers.iter().enumerate() {
            let wants_depth = slot == SHADOW_SLOT;
            let fallback = if wants_depth { self.far_depth } else { self.white };
            let texture = layer
                .filter(|&t| {
                    self.texture(t)
                        .is_some_and(|gpu| (gpu.format == DEPTH_FORMAT) == wants_depth)
                })
                .unwrap_or(fallback);
            key[slot] = texture.into();
        }
        key
    }

    fn ensure_bind_group(&mut self, key: BindKey) {
        if self.bind_groups.contains_key(&key) {
            return;
        }
        let views: Vec<&wgpu::TextureView> = key
            .iter()
            .filter_map(|&texture| self.textures.get(texture).map(|t| &t.view))
            .collect();
        if views.len() != key.len() {
            log::warn!("Layer textures {key:?} are no longer live");
            return;
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        }];
        for (slot, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Entity Layers"),
            layout: &self.texture_layout,
            entries: &entries,
        });
        self.bind_groups.insert(key, bind_group);
    }

    fn ensure_uniform_capacity(&mut self, blocks: usize) {
        if blocks <= self.uniform_capacity {
            return;
        }
        let capacity = blocks.next_power_of_two();
        let (buffer, bind_group) = create_uniform_buffer(&self.device, &self.uniform_layout, capacity);
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        self.uniform_capacity = capacity;
        log::debug!("Uniform buffer grown to {capacity} blocks");
    }

    fn queue_draw(&mut self, pipeline: PipelineHandle, primitive: PrimitiveHandle, modelview: Mat4) {
        let Some(recording) = self.recording.as_ref() else {
            log::warn!("Draw outside begin_target/end_target ignored");
            return;
        };
        let projection = recording.projection;
        let Some(gpu) = self.pipelines.get(pipeline.into()) else {
            log::warn!("Draw with unknown pipeline {pipeline:?}");
            return;
        };

        let mut block = gpu.uniforms;
        block.modelview = modelview;
        block.projection = projection;
        let draw = QueuedDraw {
            program: gpu.program,
            bind_key: self.bind_key(&gpu.layers),
            primitive,
        };

        if let Some(recording) = self.recording.as_mut() {
            recording.uniforms.push(block);
            recording.draws.push(draw);
        }
    }
}

/// Removes every bind group whose key samples one of `released`. Returns how
/// many were removed.
fn evict_bind_groups<V>(groups: &mut FxHashMap<BindKey, V>, released: &[TextureKey]) -> usize {
    if released.is_empty() {
        return 0;
    }
    let before = groups.len();
    groups.retain(|key, _| !key.iter().any(|texture| released.contains(texture)));
    before - groups.len()
}

fn create_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Entity Uniforms"),
        size: UniformBlock::SIZE * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Entity Uniforms"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_BINDING_SIZE),
            }),
        }],
    });
    (buffer, bind_group)
}

fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    for (bit, write) in [
        (ColorMask::RED, wgpu::ColorWrites::RED),
        (ColorMask::GREEN, wgpu::ColorWrites::GREEN),
        (ColorMask::BLUE, wgpu::ColorWrites::BLUE),
        (ColorMask::ALPHA, wgpu::ColorWrites::ALPHA),
    ] {
        if mask.contains(bit) {
            writes |= write;
        }
    }
    writes
}

/// Maps the unit quad `[-1, 1]²` onto `rect`.
fn rect_transform(rect: Rect) -> Mat4 {
    let center = Vec2::new(rect.x0 + rect.x1, rect.y0 + rect.y1) * 0.5;
    let half = Vec3::new((rect.x1 - rect.x0) * 0.5, (rect.y0 - rect.y1) * 0.5, 1.0);
    Mat4::from_translation(center.extend(0.0)) * Mat4::from_scale(half)
}

impl RenderDevice for WgpuDevice {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        let key = desc.program_key();
        let program = match self.program_index.get(&key) {
            Some(&program) => program,
            None => {
                let built = self.build_program(desc)?;
                let program = self.programs.len();
                self.programs.push(built);
                self.program_index.insert(key, program);
                log::debug!("Program #{program} built for '{}'", desc.label);
                program
            }
        };

        let mut layers = [None; LAYER_SLOTS.len()];
        for layer in &desc.layers {
            if let Some(slot) = slot_of(layer.index) {
                layers[slot] = layer.texture;
            } else {
                log::warn!("'{}' uses unknown layer {}", desc.label, layer.index);
            }
        }
        let mut uniforms = UniformBlock::default();
        uniforms.base_color = desc.color;

        Ok(self
            .pipelines
            .insert(GpuPipeline {
                program,
                layers,
                uniforms,
            })
            .into())
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.pipelines.remove(pipeline.into()).is_none() {
            log::warn!("Released unknown pipeline {pipeline:?}");
        }
    }

    fn set_uniform(&mut self, pipeline: PipelineHandle, uniform: Uniform, value: UniformValue) {
        match self.pipeline_mut(pipeline) {
            Some(gpu) => gpu.uniforms.set(uniform, value),
            None => log::warn!("Uniform '{}' set on unknown pipeline {pipeline:?}", uniform.name()),
        }
    }

    fn set_layer_texture(&mut self, pipeline: PipelineHandle, layer: u8, texture: TextureHandle) {
        let Some(slot) = slot_of(layer) else {
            log::warn!("Unknown layer {layer}");
            return;
        };
        if let Some(gpu) = self.pipeline_mut(pipeline) {
            gpu.layers[slot] = Some(texture);
        }
    }

    fn create_texture_rgba8(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureHandle> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(RigError::TextureAllocation(format!(
                "'{label}': {} bytes for {width}x{height}",
                pixels.len()
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        Ok(self.push_texture(texture, COLOR_FORMAT))
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if texture == self.white || texture == self.far_depth {
            log::warn!("Refusing to release a fallback texture");
            return;
        }
        if self.targets.values().any(|t| t.color == texture || t.depth == texture) {
            log::warn!("Texture {texture:?} is a target attachment; release the target instead");
            return;
        }
        self.remove_textures(&[texture.into()]);
    }

    fn create_primitive(&mut self, mesh: &Mesh) -> Result<PrimitiveHandle> {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Entity Vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Entity Indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(self
            .primitives
            .insert(GpuPrimitive {
                vertices,
                indices,
                index_count: mesh.indices.len() as u32,
            })
            .into())
    }

    fn release_primitive(&mut self, primitive: PrimitiveHandle) {
        if self.primitives.remove(primitive.into()).is_none() {
            log::warn!("Released unknown primitive {primitive:?}");
        }
    }

    fn create_target(&mut self, label: &str, width: u32, height: u32) -> Result<TargetHandle> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RigError::TargetAllocation {
                width,
                height,
                reason: format!("'{label}' must be between 1 and {max} texels per side"),
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let attachment = |format, usage| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let color_texture = attachment(
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let depth_texture = attachment(
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        let color = self.push_texture(color_texture, COLOR_FORMAT);
        let depth = self.push_texture(depth_texture, DEPTH_FORMAT);
        let handle = self.targets.insert(GpuTarget {
            color,
            depth,
            width,
            height,
        });
        log::debug!("Target '{label}' allocated at {width}x{height}");
        Ok(handle.into())
    }

    fn release_target(&mut self, target: TargetHandle) {
        let Some(gpu) = self.targets.remove(target.into()) else {
            return;
        };
        self.remove_textures(&[gpu.color.into(), gpu.depth.into()]);
    }

    fn target_color_texture(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.target(target).map(|t| t.color)
    }

    fn target_depth_texture(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.target(target).map(|t| t.depth)
    }

    fn begin_target(&mut self, frame: &TargetFrame) {
        if self.recording.is_some() {
            log::warn!("begin_target while a target is bound; dropping queued draws");
        }
        self.recording = Some(Recording {
            target: frame.target.unwrap_or(self.main_target),
            viewport: frame.viewport,
            projection: GL_TO_ZERO_ONE_DEPTH * frame.projection,
            clear: frame.clear,
            draws: Vec::new(),
            uniforms: Vec::new(),
        });
        self.modelview = Mat4::IDENTITY;
    }

    fn set_modelview(&mut self, modelview: &Mat4) {
        self.modelview = *modelview;
    }

    fn draw(&mut self, primitive: PrimitiveHandle, pipeline: PipelineHandle) {
        self.queue_draw(pipeline, primitive, self.modelview);
    }

    fn draw_rectangle(&mut self, pipeline: PipelineHandle, rect: Rect) {
        let saved = self.recording.as_ref().map(|r| r.projection);
        if let Some(recording) = self.recording.as_mut() {
            recording.projection = GL_TO_ZERO_ONE_DEPTH;
        }
        self.queue_draw(pipeline, self.rect, rect_transform(rect));
        if let (Some(recording), Some(projection)) = (self.recording.as_mut(), saved) {
            recording.projection = projection;
        }
    }

    fn end_target(&mut self) -> Result<()> {
        let Some(recording) = self.recording.take() else {
            log::warn!("end_target without a bound target");
            return Ok(());
        };
        let target = self.target(recording.target).ok_or(RigError::InvalidHandle {
            kind: TargetHandle::KIND,
            index: recording.target.raw(),
        })?;

        self.ensure_uniform_capacity(recording.uniforms.len());
        if !recording.uniforms.is_empty() {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&recording.uniforms));
        }
        for draw in &recording.draws {
            self.ensure_bind_group(draw.bind_key);
        }

        let missing = |texture: TextureHandle| RigError::InvalidHandle {
            kind: TextureHandle::KIND,
            index: texture.raw(),
        };
        let color_view = &self.texture(target.color).ok_or_else(|| missing(target.color))?.view;
        let depth_view = &self.texture(target.depth).ok_or_else(|| missing(target.depth))?.view;

        let (color_load, depth_load) = match recording.clear {
            Some(c) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(c.x),
                    g: f64::from(c.y),
                    b: f64::from(c.z),
                    a: f64::from(c.w),
                }),
                wgpu::LoadOp::Clear(1.0),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Rig Target Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Rig Target Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            let (w, h) = (target.width as f32, target.height as f32);
            let vp = recording.viewport;
            let x = vp.x.clamp(0.0, w);
            let y = vp.y.clamp(0.0, h);
            pass.set_viewport(x, y, vp.width.clamp(0.0, w - x), vp.height.clamp(0.0, h - y), 0.0, 1.0);

            for (i, draw) in recording.draws.iter().enumerate() {
                let (Some(program), Some(layers), Some(primitive)) = (
                    self.programs.get(draw.program),
                    self.bind_groups.get(&draw.bind_key),
                    self.primitives.get(draw.primitive.into()),
                ) else {
                    continue;
                };
                if primitive.index_count == 0 {
                    continue;
                }
                let offset = (i as u64 * UniformBlock::SIZE) as u32;
                pass.set_pipeline(program);
                pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
                pass.set_bind_group(1, layers, &[]);
                pass.set_vertex_buffer(0, primitive.vertices.slice(..));
                pass.set_index_buffer(primitive.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..primitive.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        log::trace!("Target {:?} submitted {} draws", recording.target, recording.draws.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_rect_maps_the_unit_quad_onto_the_viewport() {
        let m = rect_transform(Rect::FULL);
        assert_eq!(m.transform_point3(Vec3::new(-1.0, 1.0, 0.0)), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(m.transform_point3(Vec3::new(1.0, -1.0, 0.0)), Vec3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn partial_rect_keeps_orientation() {
        let rect = Rect {
            x0: 0.0,
            y0: 0.5,
            x1: 1.0,
            y1: -0.5,
        };
        let m = rect_transform(rect);
        assert_eq!(m.transform_point3(Vec3::new(-1.0, 1.0, 0.0)), Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(m.transform_point3(Vec3::new(1.0, -1.0, 0.0)), Vec3::new(1.0, -0.5, 0.0));
    }

    #[test]
    fn color_mask_maps_channel_by_channel() {
        assert_eq!(color_writes(ColorMask::ALL), wgpu::ColorWrites::ALL);
        assert_eq!(
            color_writes(ColorMask::RED | ColorMask::ALPHA),
            wgpu::ColorWrites::RED | wgpu::ColorWrites::ALPHA
        );
    }

    #[test]
    fn handles_round_trip_through_slot_keys() {
        let mut pipelines: SlotMap<PipelineKey, u32> = SlotMap::with_key();
        let first = PipelineHandle::from(pipelines.insert(1));
        assert_eq!(pipelines.get(first.into()), Some(&1));

        pipelines.remove(first.into());
        let second = PipelineHandle::from(pipelines.insert(2));
        assert_eq!(pipelines.len(), 1);
        assert_ne!(first, second);
        assert_eq!(pipelines.get(first.into()), None);
        assert_eq!(pipelines.get(second.into()), Some(&2));
    }

    #[test]
    fn releasing_a_texture_evicts_bind_groups_that_sample_it() {
        let mut textures: SlotMap<TextureKey, ()> = SlotMap::with_key();
        let white = textures.insert(());
        let video_a = textures.insert(());
        let video_b = textures.insert(());

        let key_with = |texture: TextureKey| {
            let mut key = [white; LAYER_SLOTS.len()];
            key[1] = texture;
            key
        };
        let mut groups: FxHashMap<BindKey, ()> = FxHashMap::default();
        groups.insert([white; LAYER_SLOTS.len()], ());
        groups.insert(key_with(video_a), ());
        groups.insert(key_with(video_b), ());

        assert_eq!(evict_bind_groups(&mut groups, &[]), 0);
        assert_eq!(evict_bind_groups(&mut groups, &[video_a]), 1);
        assert!(!groups.contains_key(&key_with(video_a)));
        assert!(groups.contains_key(&key_with(video_b)));
        assert!(groups.contains_key(&[white; LAYER_SLOTS.len()]));

        // Every cached group samples the fallback.
        assert_eq!(evict_bind_groups(&mut groups, &[white]), 2);
        assert!(groups.is_empty());
    }

    #[test]
    fn every_layer_has_a_bind_slot() {
        assert_eq!(slot_of(LAYER_SHADOW_MAP), Some(SHADOW_SLOT));
        for layer in LAYER_SLOTS {
            assert!(slot_of(layer).is_some());
        }
        assert_eq!(slot_of(2), None);
    }
}
