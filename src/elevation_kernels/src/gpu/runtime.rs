//! CUDA runtime and launch wrappers for the per-cell kernels.

use anyhow::{bail, Result};
use cubecl::client::ComputeClient;
use cubecl::cuda::{CudaDevice, CudaRuntime};
use cubecl::prelude::*;
use tracing::debug;

use super::kernels::{dilation_kernel, polygon_mask_kernel, reduce_accumulator_kernel};
use crate::config::ElevationMapConfig;
use crate::grid::{ElevationLayers, GridGeometry, Layer};
use crate::polygon::{ray_extent, Polygon};
use crate::update::ReductionStats;

/// Type alias for CUDA compute client
type CudaClient = ComputeClient<<CudaRuntime as Runtime>::Server>;

const BLOCK_SIZE: u32 = 256;

/// Largest grid side the polygon kernel handles without `i32` overflow in
/// its orientation products.
pub const MAX_POLYGON_GRID_SIDE: usize = 16_384;

/// GPU runtime for the per-cell passes.
pub struct GpuRuntime {
    /// CUDA device (kept alive for runtime lifetime)
    #[allow(dead_code)]
    device: CudaDevice,
    client: CudaClient,
}

impl GpuRuntime {
    /// Create a new GPU runtime with the default CUDA device.
    pub fn new() -> Result<Self> {
        Self::with_device_id(0)
    }

    /// Create a new GPU runtime with a specific CUDA device.
    pub fn with_device_id(device_id: usize) -> Result<Self> {
        let device = CudaDevice::new(device_id);
        let client = CudaRuntime::client(&device);

        Ok(Self { device, client })
    }

    pub fn client(&self) -> &CudaClient {
        &self.client
    }

    fn cube_count(num_cells: usize) -> CubeCount {
        CubeCount::Static((num_cells as u32).div_ceil(BLOCK_SIZE), 1, 1)
    }

    /// GPU counterpart of [`crate::update::reduce_accumulator`].
    pub fn reduce_accumulator(
        &self,
        config: &ElevationMapConfig,
        accumulator: &ElevationLayers,
        live_map: &mut ElevationLayers,
    ) -> Result<ReductionStats> {
        let num_cells = live_map.num_cells();
        if accumulator.num_cells() != num_cells {
            bail!(
                "accumulator has {} cells, live map has {num_cells}",
                accumulator.num_cells()
            );
        }

        let acc_flat = accumulator.to_vec();
        let map_flat = live_map.to_vec();
        let len = map_flat.len();

        let acc_gpu = self.client.create(f32::as_bytes(&acc_flat));
        let map_gpu = self.client.create(f32::as_bytes(&map_flat));

        unsafe {
            reduce_accumulator_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                Self::cube_count(num_cells),
                CubeDim::new(BLOCK_SIZE, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&acc_gpu, len, 1),
                ScalarArg::new(config.max_variance),
                ScalarArg::new(config.initial_variance),
                ScalarArg::new(num_cells as u32),
                ArrayArg::from_raw_parts::<f32>(&map_gpu, len, 1),
            );
        }

        let map_bytes = self.client.read_one(map_gpu);
        live_map.copy_from_slice(f32::from_bytes(&map_bytes))?;

        // Stats from the host-side accumulator snapshot
        let offset = num_cells * Layer::Validity.index();
        let mut stats = ReductionStats::default();
        for (idx, &count) in acc_flat[offset..offset + num_cells].iter().enumerate() {
            if count > 0.0 {
                if acc_flat[num_cells + idx] / count > config.max_variance {
                    stats.reset += 1;
                } else {
                    stats.committed += 1;
                }
            }
        }

        debug!(
            committed = stats.committed,
            reset = stats.reset,
            "reduced accumulator on GPU"
        );
        Ok(stats)
    }

    /// GPU counterpart of [`crate::filtering::fill_holes`].
    pub fn fill_holes(
        &self,
        geometry: &GridGeometry,
        heights: &[f32],
        validity_mask: &[f32],
        dilation_size: usize,
    ) -> Result<Vec<f32>> {
        let num_cells = geometry.num_cells();
        if heights.len() != num_cells || validity_mask.len() != num_cells {
            bail!(
                "expected {num_cells} cells, got {} heights and {} mask values",
                heights.len(),
                validity_mask.len()
            );
        }

        let heights_gpu = self.client.create(f32::as_bytes(heights));
        let mask_gpu = self.client.create(f32::as_bytes(validity_mask));
        let output_gpu = self.client.empty(num_cells * std::mem::size_of::<f32>());

        unsafe {
            dilation_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                Self::cube_count(num_cells),
                CubeDim::new(BLOCK_SIZE, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&heights_gpu, num_cells, 1),
                ArrayArg::from_raw_parts::<f32>(&mask_gpu, num_cells, 1),
                ScalarArg::new(geometry.width as u32),
                ScalarArg::new(geometry.height as u32),
                ScalarArg::new(dilation_size as u32),
                ScalarArg::new(num_cells as u32),
                ArrayArg::from_raw_parts::<f32>(&output_gpu, num_cells, 1),
            );
        }

        let output_bytes = self.client.read_one(output_gpu);
        Ok(f32::from_bytes(&output_bytes).to_vec())
    }

    /// GPU counterpart of [`crate::polygon::rasterize_polygon`].
    pub fn rasterize_polygon(
        &self,
        geometry: &GridGeometry,
        polygon: &Polygon,
        center_x: f32,
        center_y: f32,
    ) -> Result<Vec<u8>> {
        let num_cells = geometry.num_cells();
        if geometry.width.max(geometry.height) > MAX_POLYGON_GRID_SIDE {
            bail!(
                "grid side {} exceeds {MAX_POLYGON_GRID_SIDE} supported by the GPU polygon kernel",
                geometry.width.max(geometry.height)
            );
        }
        if polygon.is_empty() {
            return Ok(vec![0; num_cells]);
        }

        let vertices: Vec<i32> = polygon
            .cell_vertices(geometry, center_x, center_y)
            .iter()
            .flat_map(|v| [v.x as i32, v.y as i32])
            .collect();
        let (bmin, bmax) = polygon.cell_bounding_box(geometry, center_x, center_y);
        let bbox = [bmin.x as i32, bmin.y as i32, bmax.x as i32, bmax.y as i32];

        let vertices_gpu = self.client.create(i32::as_bytes(&vertices));
        let bbox_gpu = self.client.create(i32::as_bytes(&bbox));
        let mask_gpu = self.client.empty(num_cells * std::mem::size_of::<u32>());

        unsafe {
            polygon_mask_kernel::launch_unchecked::<CudaRuntime>(
                &self.client,
                Self::cube_count(num_cells),
                CubeDim::new(BLOCK_SIZE, 1, 1),
                ArrayArg::from_raw_parts::<i32>(&vertices_gpu, vertices.len(), 1),
                ArrayArg::from_raw_parts::<i32>(&bbox_gpu, 4, 1),
                ScalarArg::new((vertices.len() / 2) as u32),
                ScalarArg::new(ray_extent(geometry) as i32),
                ScalarArg::new(geometry.width as u32),
                ScalarArg::new(num_cells as u32),
                ArrayArg::from_raw_parts::<u32>(&mask_gpu, num_cells, 1),
            );
        }

        let mask_bytes = self.client.read_one(mask_gpu);
        Ok(u32::from_bytes(&mask_bytes)
            .iter()
            .map(|&m| m as u8)
            .collect())
    }
}

/// Check if CUDA is available.
pub fn is_cuda_available() -> bool {
    // Try to create a device - if it fails, CUDA is not available
    std::panic::catch_unwind(|| {
        let _device = CudaDevice::new(0);
    })
    .is_ok()
}
