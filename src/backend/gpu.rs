// Copyright 2024 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! GPU backend using wgpu compute shaders.

use super::{BackendKind, RecordBackend, RecordContribution, RecordJob, RecordStatus};
use crate::{evaluator::Evaluator, ForceError, Result, Vector3};
use bytemuck::{Pod, Zeroable};
use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard},
};
use wgpu::util::DeviceExt;

/// Threads per workgroup; must match `@workgroup_size` in the shaders
pub(crate) const WORKGROUP_SIZE: u32 = 64;

/// Largest number of workgroups in one dispatch dimension
pub(crate) const MAX_WORKGROUPS: usize = 65_535;

/// Adapter, device and queue shared by all GPU computes.
///
/// wgpu does not handle concurrent submissions well, so every dispatch
/// holds the submission lock until its results are read back.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    submit_lock: Mutex<()>,
}

impl GpuContext {
    fn request_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    /// Check if a GPU is available for compute.
    pub fn is_available() -> bool {
        Self::request_adapter(&Self::instance()).is_some()
    }

    /// Open the first high performance adapter
    pub fn new() -> Result<Self> {
        let adapter = Self::request_adapter(&Self::instance())
            .ok_or_else(|| ForceError::backend("failed to find a suitable GPU adapter"))?;
        let adapter_name = adapter.get_info().name;
        info!("Using GPU adapter: {adapter_name:?}");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("forcecore"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|err| ForceError::backend(format!("device request failed: {err}")))?;

        Ok(Self {
            device,
            queue,
            adapter_name,
            submit_lock: Mutex::new(()),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.submit_lock
            .lock()
            .map_err(|_| ForceError::backend("GPU submission lock poisoned"))
    }

    /// Compile `source` and build a pipeline for `entry_point`, turning
    /// validation failures into errors instead of panics
    pub(crate) fn compute_pipeline(
        &self,
        label: &str,
        source: &str,
        layout: &wgpu::BindGroupLayout,
        entry_points: &[&str],
    ) -> Result<Vec<wgpu::ComputePipeline>> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
        let pipelines = entry_points
            .iter()
            .map(|entry_point| {
                self.device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(label),
                        layout: Some(&pipeline_layout),
                        module: &shader,
                        entry_point: Some(*entry_point),
                        compilation_options: Default::default(),
                        cache: None,
                    })
            })
            .collect();
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ForceError::backend(format!("{label}: {err}")));
        }
        Ok(pipelines)
    }

    /// Bind group layout with the given storage buffers followed by a
    /// uniform buffer at the last binding
    pub(crate) fn bind_group_layout(
        &self,
        label: &str,
        storage_read_only: &[bool],
    ) -> wgpu::BindGroupLayout {
        let buffer_entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let mut entries: Vec<_> = storage_read_only
            .iter()
            .enumerate()
            .map(|(binding, &read_only)| {
                buffer_entry(
                    binding as u32,
                    wgpu::BufferBindingType::Storage { read_only },
                )
            })
            .collect();
        entries.push(buffer_entry(
            storage_read_only.len() as u32,
            wgpu::BufferBindingType::Uniform,
        ));
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
    }

    pub(crate) fn bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// Read-only storage buffer initialised from `contents`
    pub(crate) fn storage_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
    }

    pub(crate) fn uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Writable storage buffer whose contents can be copied out
    pub(crate) fn output_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Record a copy of `source` into a new mappable staging buffer
    pub(crate) fn stage(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Buffer,
        size: u64,
    ) -> wgpu::Buffer {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        staging
    }

    /// Block until `staging` is mapped and copy out its contents
    pub(crate) fn read_staged<T: Pod>(&self, staging: &wgpu::Buffer) -> Result<Vec<T>> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| ForceError::backend("GPU readback was cancelled"))?
            .map_err(|err| ForceError::backend(format!("GPU readback failed: {err}")))?;

        let data = slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }
}

/// Pack positions as `vec4<f32>` with `w` set by `w`
pub(crate) fn pack_positions(positions: &[Vector3], w: impl Fn(usize) -> f32) -> Vec<[f32; 4]> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| [p.x as f32, p.y as f32, p.z as f32, w(i)])
        .collect()
}

/// Per-particle `(charge, diameter, 0, 0)`; attributes the evaluator
/// does not need are zero
pub(crate) fn pack_attributes(
    n: usize,
    charges: Option<&[f64]>,
    diameters: Option<&[f64]>,
) -> Vec<[f32; 4]> {
    let charges = charges.unwrap_or_default();
    let diameters = diameters.unwrap_or_default();
    (0..n)
        .map(|i| {
            [
                charges.get(i).copied().unwrap_or(0.0) as f32,
                diameters.get(i).copied().unwrap_or(0.0) as f32,
                0.0,
                0.0,
            ]
        })
        .collect()
}

/// Box lengths and periodicity as uploaded to the shaders
pub(crate) fn pack_box(global_box: &crate::BoxDim) -> ([f32; 4], [u32; 4]) {
    let l = global_box.lengths();
    let p = global_box.periodic();
    (
        [l.x as f32, l.y as f32, l.z as f32, 0.0],
        [p[0] as u32, p[1] as u32, p[2] as u32, 0],
    )
}

/// GPU-compatible uniform parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuRecordUniforms {
    box_len: [f32; 4],
    periodic: [u32; 4],
    n_records: u32,
    use_cutoff: u32,
    shift: u32,
    _pad: u32,
}

/// Per-record output, mirrors `Contribution` in `records.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuContribution {
    dx: [f32; 4],
    result: [f32; 4],
}

impl From<&GpuContribution> for RecordContribution {
    fn from(c: &GpuContribution) -> Self {
        let status = match c.dx[3] as u32 {
            1 => RecordStatus::Evaluated,
            2 => RecordStatus::OutOfBounds,
            3 => RecordStatus::ShiftRejected,
            _ => RecordStatus::Skipped,
        };
        Self {
            dx: Vector3::new(c.dx[0] as f64, c.dx[1] as f64, c.dx[2] as f64),
            force_divr: c.result[0] as f64,
            energy: c.result[1] as f64,
            status,
        }
    }
}

/// One compute shader invocation per interaction record, in single precision.
///
/// The shader is the generic record kernel with the force law of `E`
/// appended, compiled once at construction.
pub struct GpuRecordBackend<E: Evaluator> {
    context: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    _evaluator: PhantomData<fn() -> E>,
}

impl<E: Evaluator> GpuRecordBackend<E> {
    pub fn new(context: Arc<GpuContext>) -> Result<Self> {
        let source = format!(
            "{}\n// force law: {}\n{}",
            include_str!("../shaders/records.wgsl"),
            E::name(),
            E::wgsl()
        );
        let label = format!("records.{}", E::name());
        // records, positions, attributes, params, rcutsq, contributions
        let bind_group_layout =
            context.bind_group_layout(&label, &[true, true, true, true, true, false]);
        let pipeline = context
            .compute_pipeline(&label, &source, &bind_group_layout, &["main"])?
            .pop()
            .ok_or_else(|| ForceError::backend("no pipeline created"))?;
        debug!("compiled GPU record kernel for {}", E::name());
        Ok(Self {
            context,
            pipeline,
            bind_group_layout,
            _evaluator: PhantomData,
        })
    }

    fn evaluate_chunk(
        &self,
        records: &[[u32; 4]],
        constant: &[&wgpu::Buffer; 4],
        uniforms: GpuRecordUniforms,
    ) -> Result<Vec<GpuContribution>> {
        let context = &self.context;
        let record_buffer = context.storage_buffer("Records", bytemuck::cast_slice(records));
        let size = (records.len() * std::mem::size_of::<GpuContribution>()) as u64;
        let output_buffer = context.output_buffer("Contributions", size);
        let uniform_buffer = context.uniform_buffer(
            "Record Uniforms",
            bytemuck::bytes_of(&GpuRecordUniforms {
                n_records: records.len() as u32,
                ..uniforms
            }),
        );
        let [positions, attributes, params, rcutsq] = *constant;
        let bind_group = context.bind_group(
            "Record Bind Group",
            &self.bind_group_layout,
            &[
                &record_buffer,
                positions,
                attributes,
                params,
                rcutsq,
                &output_buffer,
                &uniform_buffer,
            ],
        );

        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Record Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Record Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups((records.len() as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        let staging = context.stage(&mut encoder, &output_buffer, size);
        context.queue().submit(std::iter::once(encoder.finish()));
        context.read_staged(&staging)
    }
}

impl<E: Evaluator> RecordBackend<E> for GpuRecordBackend<E> {
    fn evaluate(&self, job: &RecordJob<E::Param>) -> Result<Vec<RecordContribution>> {
        if job.records.is_empty() {
            return Ok(Vec::new());
        }
        let _lock = self.context.lock()?;
        let context = &self.context;

        let attributes = pack_attributes(job.positions.len(), job.charges, job.diameters);
        let params: Vec<[f32; 4]> = job.params.iter().map(E::gpu_params).collect();
        let rcutsq: Vec<f32> = match job.cutoff {
            Some(cutoff) => cutoff.rcutsq.iter().map(|&r| r as f32).collect(),
            None => vec![0.0],
        };

        let positions = pack_positions(job.positions, |_| 0.0);
        let positions = context.storage_buffer("Positions", bytemuck::cast_slice(&positions));
        let attributes = context.storage_buffer("Attributes", bytemuck::cast_slice(&attributes));
        let params = context.storage_buffer("Params", bytemuck::cast_slice(&params));
        let rcutsq = context.storage_buffer("Cutoffs", bytemuck::cast_slice(&rcutsq));

        let (box_len, periodic) = pack_box(job.global_box);
        let uniforms = GpuRecordUniforms {
            box_len,
            periodic,
            n_records: 0,
            use_cutoff: job.cutoff.is_some() as u32,
            shift: job.cutoff.is_some_and(|c| c.shift) as u32,
            _pad: 0,
        };

        let records: Vec<[u32; 4]> = job
            .records
            .iter()
            .map(|r| [r.idx[0], r.idx[1], r.type_id, 0])
            .collect();

        let mut contributions = Vec::with_capacity(records.len());
        for chunk in records.chunks(MAX_WORKGROUPS * WORKGROUP_SIZE as usize) {
            let output =
                self.evaluate_chunk(chunk, &[&positions, &attributes, &params, &rcutsq], uniforms)?;
            contributions.extend(output.iter().map(RecordContribution::from));
        }
        Ok(contributions)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_per_particle() {
        let charges = [1.5, -2.0, 0.5];
        let packed = pack_attributes(3, Some(&charges), None);
        assert_eq!(
            packed,
            vec![[1.5, 0.0, 0.0, 0.0], [-2.0, 0.0, 0.0, 0.0], [0.5, 0.0, 0.0, 0.0]]
        );
        let diameters = [1.0, 2.0];
        let packed = pack_attributes(2, Some(&charges[..2]), Some(&diameters));
        assert_eq!(packed[1], [-2.0, 2.0, 0.0, 0.0]);
        assert_eq!(pack_attributes(2, None, None), vec![[0.0; 4]; 2]);
    }
}
