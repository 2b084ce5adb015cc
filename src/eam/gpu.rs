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

//! EAM on the GPU.
//!
//! Tables and the per-particle scratch space live on the device for the
//! lifetime of the compute. Every step uploads positions and a full
//! neighbor list and runs two particle-centric passes.

use super::{EamPair, EamTables};
use crate::{
    backend::gpu::{pack_box, pack_positions, GpuContext, MAX_WORKGROUPS, WORKGROUP_SIZE},
    output::ForceOutput,
    particles::ParticleStore,
    ForceError, Result, Vector3,
};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

/// Largest number of particle types supported on the device
pub const MAX_GPU_TYPES: usize = 44;

/// Mirrors `Uniforms` in `eam.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct EamUniforms {
    box_len: [f32; 4],
    periodic: [u32; 4],
    n_local: u32,
    n_total: u32,
    nr: u32,
    nrho: u32,
    rdr: f32,
    rdrho: f32,
    n_types: u32,
    embedding_offset: u32,
    pair_offset: u32,
    _pad: [u32; 3],
}

/// Mirrors `ParticleOut` in `eam.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ParticleOut {
    force: [f32; 4],
    virial_a: [f32; 4],
    virial_b: [f32; 4],
}

impl ParticleOut {
    fn virial(&self) -> [f64; 6] {
        let [xx, xy, xz, yy] = self.virial_a;
        let [yz, zz, _, _] = self.virial_b;
        [xx, xy, xz, yy, yz, zz].map(f64::from)
    }
}

/// Where each table family starts in the shared table buffer
#[derive(Clone, Copy, Debug)]
struct TableLayout {
    n_types: u32,
    nr: u32,
    nrho: u32,
    rdr: f32,
    rdrho: f32,
    embedding_offset: u32,
    pair_offset: u32,
}

/// Device resources of one EAM compute
pub struct EamGpu {
    context: Arc<GpuContext>,
    density_pipeline: wgpu::ComputePipeline,
    force_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    tables: wgpu::Buffer,
    layout: TableLayout,
    embedding_derivs: wgpu::Buffer,
    particles_out: wgpu::Buffer,
    status: wgpu::Buffer,
    max_particles: usize,
}

impl EamGpu {
    pub fn new(context: Arc<GpuContext>, tables: &EamTables, max_particles: usize) -> Result<Self> {
        let max_dispatch = MAX_WORKGROUPS * WORKGROUP_SIZE as usize;
        if max_particles == 0 || max_particles > max_dispatch {
            return Err(ForceError::backend(format!(
                "EAM: capacity must be in 1..={max_dispatch}, got {max_particles}"
            )));
        }
        let (table_buffer, layout) = Self::upload(&context, tables)?;

        // positions, neighbors, tables, F', output, status
        let bind_group_layout =
            context.bind_group_layout("EAM", &[true, true, true, false, false, false]);
        let pipelines = context.compute_pipeline(
            "EAM",
            include_str!("../shaders/eam.wgsl"),
            &bind_group_layout,
            &["compute_density", "compute_forces"],
        )?;
        let [density_pipeline, force_pipeline]: [wgpu::ComputePipeline; 2] = pipelines
            .try_into()
            .map_err(|_| ForceError::backend("EAM: expected two pipelines"))?;

        let embedding_derivs = context.output_buffer(
            "EAM Embedding Derivatives",
            (max_particles * std::mem::size_of::<f32>()) as u64,
        );
        let particles_out = context.output_buffer(
            "EAM Output",
            (max_particles * std::mem::size_of::<ParticleOut>()) as u64,
        );
        let status = context.output_buffer("EAM Status", std::mem::size_of::<u32>() as u64);
        debug!("allocated EAM device scratch for {max_particles} particles");

        Ok(Self {
            context,
            density_pipeline,
            force_pipeline,
            bind_group_layout,
            tables: table_buffer,
            layout,
            embedding_derivs,
            particles_out,
            status,
            max_particles,
        })
    }

    pub fn max_particles(&self) -> usize {
        self.max_particles
    }

    fn upload(context: &GpuContext, tables: &EamTables) -> Result<(wgpu::Buffer, TableLayout)> {
        if tables.n_types() > MAX_GPU_TYPES {
            return Err(ForceError::backend(format!(
                "EAM: {} types exceed the GPU limit of {MAX_GPU_TYPES}",
                tables.n_types()
            )));
        }
        let density = tables.density().interleaved_f32();
        let embedding = tables.embedding().interleaved_f32();
        let pair = tables.pair().interleaved_f32();
        let layout = TableLayout {
            n_types: tables.n_types() as u32,
            nr: tables.density().len() as u32,
            nrho: tables.embedding().len() as u32,
            rdr: tables.rdr() as f32,
            rdrho: tables.rdrho() as f32,
            embedding_offset: density.len() as u32,
            pair_offset: (density.len() + embedding.len()) as u32,
        };
        let data: Vec<[f32; 2]> = [density, embedding, pair].concat();
        let buffer = context.storage_buffer("EAM Tables", bytemuck::cast_slice(&data));
        Ok((buffer, layout))
    }

    /// Replace the device tables
    pub fn upload_tables(&mut self, tables: &EamTables) -> Result<()> {
        let (buffer, layout) = Self::upload(&self.context, tables)?;
        self.tables.destroy();
        self.tables = buffer;
        self.layout = layout;
        Ok(())
    }

    /// Full neighbor list as row offsets followed by neighbor indices
    fn neighbor_rows(n_total: usize, pairs: &[EamPair]) -> Vec<u32> {
        let mut counts = vec![0u32; n_total + 1];
        for p in pairs {
            let [a, b] = p.record.idx;
            counts[a as usize + 1] += 1;
            counts[b as usize + 1] += 1;
        }
        for i in 0..n_total {
            counts[i + 1] += counts[i];
        }
        let mut rows = counts.clone();
        rows.resize(n_total + 1 + 2 * pairs.len(), 0);
        let mut fill = counts;
        for p in pairs {
            let [a, b] = p.record.idx;
            for (from, to) in [(a, b), (b, a)] {
                let slot = &mut fill[from as usize];
                rows[n_total + 1 + *slot as usize] = to;
                *slot += 1;
            }
        }
        rows
    }

    /// Evaluate one step and add the results to `output`.
    ///
    /// A table lookup out of range is reported as [`ForceError::TableOutOfRange`]
    /// without the offending argument.
    pub(crate) fn compute(
        &mut self,
        particles: &dyn ParticleStore,
        pairs: &[EamPair],
        tables: &EamTables,
        compute_virial: bool,
        output: &mut ForceOutput,
    ) -> Result<()> {
        let n_total = particles.n_total();
        let n_local = particles.n_local();
        if n_total > self.max_particles {
            return Err(ForceError::backend(format!(
                "EAM: {n_total} particles exceed the GPU capacity of {}",
                self.max_particles
            )));
        }
        if n_local == 0 {
            return Ok(());
        }
        let context = &self.context;
        let _lock = context.lock()?;

        let types = particles.types();
        let positions = pack_positions(particles.positions(), |i| types[i] as f32);
        let rows = Self::neighbor_rows(n_total, pairs);
        let positions = context.storage_buffer("EAM Positions", bytemuck::cast_slice(&positions));
        let neighbors = context.storage_buffer("EAM Neighbors", bytemuck::cast_slice(&rows));

        let (box_len, periodic) = pack_box(particles.global_box());
        let layout = self.layout;
        let uniforms = EamUniforms {
            box_len,
            periodic,
            n_local: n_local as u32,
            n_total: n_total as u32,
            nr: layout.nr,
            nrho: layout.nrho,
            rdr: layout.rdr,
            rdrho: layout.rdrho,
            n_types: layout.n_types,
            embedding_offset: layout.embedding_offset,
            pair_offset: layout.pair_offset,
            _pad: [0; 3],
        };
        let uniforms = context.uniform_buffer("EAM Uniforms", bytemuck::bytes_of(&uniforms));
        context
            .queue()
            .write_buffer(&self.status, 0, bytemuck::bytes_of(&0u32));

        let bind_group = context.bind_group(
            "EAM Bind Group",
            &self.bind_group_layout,
            &[
                &positions,
                &neighbors,
                &self.tables,
                &self.embedding_derivs,
                &self.particles_out,
                &self.status,
                &uniforms,
            ],
        );

        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("EAM Encoder"),
            });
        for (pipeline, n) in [
            (&self.density_pipeline, n_total),
            (&self.force_pipeline, n_local),
        ] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("EAM Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups((n as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        let out_size = (n_local * std::mem::size_of::<ParticleOut>()) as u64;
        let staged_out = context.stage(&mut encoder, &self.particles_out, out_size);
        let staged_status =
            context.stage(&mut encoder, &self.status, std::mem::size_of::<u32>() as u64);
        context.queue().submit(std::iter::once(encoder.finish()));

        let status: Vec<u32> = context.read_staged(&staged_status)?;
        let results: Vec<ParticleOut> = context.read_staged(&staged_out)?;
        positions.destroy();
        neighbors.destroy();

        if status.first().is_some_and(|&s| s != 0) {
            error!("pair.eam: table lookup out of range on the GPU");
            return Err(ForceError::TableOutOfRange {
                x: f64::NAN,
                x_max: tables.embedding().x_max(),
            });
        }
        for (i, p) in results.iter().enumerate() {
            let [fx, fy, fz, energy] = p.force.map(f64::from);
            let virial = compute_virial.then(|| p.virial());
            output.add(i, Vector3::new(fx, fy, fz), energy, virial.as_ref());
        }
        Ok(())
    }
}

impl Drop for EamGpu {
    fn drop(&mut self) {
        self.tables.destroy();
        self.embedding_derivs.destroy();
        self.particles_out.destroy();
        self.status.destroy();
        debug!("released EAM device buffers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResolvedRecord;

    fn pair(a: u32, b: u32) -> EamPair {
        EamPair {
            record: ResolvedRecord {
                idx: [a, b],
                tags: [a, b],
                type_id: 0,
            },
            dx: Vector3::zeros(),
            r: 1.0,
        }
    }

    #[test]
    fn test_neighbor_rows_are_symmetric() {
        let rows = EamGpu::neighbor_rows(4, &[pair(0, 1), pair(0, 3), pair(2, 3)]);
        let (offsets, neighbors) = rows.split_at(5);
        assert_eq!(offsets, &[0, 2, 3, 4, 6]);
        assert_eq!(neighbors, &[1, 3, 0, 3, 0, 2]);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<EamUniforms>(), 80);
        assert_eq!(std::mem::size_of::<ParticleOut>(), 48);
    }
}
