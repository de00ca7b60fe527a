//! wgpu compute engine: device selection, pipeline and dispatch setup.
//!
//! One engine owns the device, queue, compute pipeline and the
//! indirect-dispatch argument buffer. Frame slots and the scheduling
//! loop live in [`frames`] and [`crate::scheduler`]; the engine itself
//! is read-only after creation and shared by every frame.

use std::path::PathBuf;
use std::sync::Mutex;

use wgpu::util::DeviceExt;

use crate::candidate::RECORD_SIZE;
use crate::{JhError, JhResult};

pub mod frames;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

/// Embedded WGSL kernel source: Jenkins lookup3 over candidate records.
const LOOKUP3_KERNEL_SOURCE: &str = include_str!("../../kernels/lookup3.wgsl");

/// Workgroup size and workgroup count triples for one dispatch.
///
/// Values are clamped to device limits at engine creation; the clamped
/// configuration decides the per-frame batch capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub workgroup_size: [u32; 3],
    pub workgroup_count: [u32; 3],
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            workgroup_size: [64, 1, 1],
            workgroup_count: [3, 1, 1],
        }
    }
}

impl DispatchConfig {
    pub fn new(workgroup_size: [u32; 3], workgroup_count: [u32; 3]) -> Self {
        DispatchConfig {
            workgroup_size,
            workgroup_count,
        }
    }

    /// Candidates covered by one dispatch: invocations per group times
    /// the number of groups. Saturating, since the triples are clamped
    /// to device limits only at engine creation.
    pub fn batch_capacity(&self) -> usize {
        self.invocations_per_group()
            .saturating_mul(self.group_count())
            .min(usize::MAX as u64) as usize
    }

    fn invocations_per_group(&self) -> u64 {
        self.workgroup_size
            .iter()
            .fold(1u64, |acc, &v| acc.saturating_mul(v as u64))
    }

    fn group_count(&self) -> u64 {
        self.workgroup_count
            .iter()
            .fold(1u64, |acc, &v| acc.saturating_mul(v as u64))
    }

    /// Clamp both triples to what the device grants.
    fn clamped(mut self, limits: &wgpu::Limits) -> Self {
        let size_limits = [
            limits.max_compute_workgroup_size_x,
            limits.max_compute_workgroup_size_y,
            limits.max_compute_workgroup_size_z,
        ];
        for (axis, &limit) in self.workgroup_size.iter_mut().zip(&size_limits) {
            *axis = (*axis).clamp(1, limit);
        }
        for axis in self.workgroup_count.iter_mut() {
            *axis = (*axis).clamp(1, limits.max_compute_workgroups_per_dimension);
        }

        // Halve the widest axis until the per-group invocation limit fits.
        while self.invocations_per_group() > limits.max_compute_invocations_per_workgroup as u64 {
            let widest = (0..3)
                .max_by_key(|&i| self.workgroup_size[i])
                .unwrap_or(0);
            self.workgroup_size[widest] = (self.workgroup_size[widest] / 2).max(1);
        }
        self
    }
}

/// Information about a discovered compute device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Graphics backend serving the adapter.
    pub backend: String,
    /// Whether this is a hardware GPU rather than a software device.
    pub is_gpu: bool,
    /// Maximum workgroup size along x.
    pub max_workgroup_size: u32,
}

/// Probe all available compute devices without creating an engine.
pub fn probe_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            let limits = adapter.limits();
            DeviceInfo {
                name: info.name.clone(),
                backend: format!("{:?}", info.backend),
                is_gpu: matches!(
                    info.device_type,
                    wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu
                ),
                max_workgroup_size: limits.max_compute_workgroup_size_x,
            }
        })
        .collect()
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Require a hardware adapter; reject CPU/software devices.
    pub prefer_gpu: bool,
    /// Time GPU dispatches with timestamp queries when supported.
    pub profiling: bool,
    /// External WGSL path overriding the embedded kernel.
    pub shader: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            prefer_gpu: true,
            profiling: false,
            shader: None,
        }
    }
}

/// wgpu compute engine for the lookup3 kernel.
///
/// Create one engine per run and share it across frames. The pipeline
/// bakes the workgroup size in through override constants; the group
/// counts live in the indirect buffer, so one recorded sequence serves
/// any configured dispatch extent.
pub struct GpuEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    indirect_buf: wgpu::Buffer,
    dispatch: DispatchConfig,
    device_name: String,
    is_cpu: bool,
    max_buffer_size: u64,
    profiling: bool,
    /// Wrapped in Mutex because the profiler API wants &mut self while
    /// the engine hands out &self everywhere.
    profiler: Option<Mutex<wgpu_profiler::GpuProfiler>>,
}

impl std::fmt::Debug for GpuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuEngine")
            .field("device_name", &self.device_name)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl GpuEngine {
    /// Create an engine on the best available GPU device.
    pub fn new(dispatch: DispatchConfig) -> JhResult<Self> {
        Self::with_options(dispatch, &EngineOptions::default())
    }

    /// Create an engine with per-dispatch GPU timing enabled.
    pub fn with_profiling(dispatch: DispatchConfig, profiling: bool) -> JhResult<Self> {
        Self::with_options(
            dispatch,
            &EngineOptions {
                profiling,
                ..EngineOptions::default()
            },
        )
    }

    pub fn with_options(dispatch: DispatchConfig, options: &EngineOptions) -> JhResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_pref = if options.prefer_gpu {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::None
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_pref,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|_| JhError::Unsupported)?;

        let info = adapter.get_info();
        let device_name = info.name.clone();
        let is_cpu = matches!(info.device_type, wgpu::DeviceType::Cpu);

        // Software rasterizers are far too slow for brute-force hashing
        // and can hang the queue; reject them when a real GPU was asked for.
        if options.prefer_gpu && is_cpu {
            return Err(JhError::Unsupported);
        }

        let supports_timestamps = adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let use_timestamps = options.profiling && supports_timestamps;
        let required_features = if use_timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("jenhash"),
            required_features,
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|_| JhError::Unsupported)?;

        let limits = device.limits();
        let dispatch = dispatch.clamped(&limits);
        let max_buffer_size = limits.max_storage_buffer_binding_size as u64;

        let source = match &options.shader {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| JhError::Shader(format!("{}: {e}", path.display())))?,
            None => LOOKUP3_KERNEL_SOURCE.to_string(),
        };

        // Shader and pipeline validation errors surface here instead of
        // crashing the run later through the uncaptured-error handler.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lookup3"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let constants = [
            ("wg_x", dispatch.workgroup_size[0] as f64),
            ("wg_y", dispatch.workgroup_size[1] as f64),
            ("wg_z", dispatch.workgroup_size[2] as f64),
        ];
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("lookup3"),
            layout: None,
            module: &module,
            entry_point: Some("hash_main"),
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(JhError::Shader(error.to_string()));
        }

        // Written once; every frame's dispatch reads its group counts
        // from here at execute time.
        let indirect_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dispatch_args"),
            contents: bytemuck::cast_slice(&dispatch.workgroup_count),
            usage: wgpu::BufferUsages::INDIRECT,
        });

        let profiler = if use_timestamps {
            match wgpu_profiler::GpuProfiler::new(
                &device,
                wgpu_profiler::GpuProfilerSettings::default(),
            ) {
                Ok(p) => Some(Mutex::new(p)),
                Err(_) => None,
            }
        } else {
            None
        };

        Ok(GpuEngine {
            device,
            queue,
            pipeline,
            indirect_buf,
            dispatch,
            device_name,
            is_cpu,
            max_buffer_size,
            profiling: options.profiling,
            profiler,
        })
    }

    /// Name of the selected compute device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The dispatch configuration after clamping to device limits.
    pub fn dispatch(&self) -> DispatchConfig {
        self.dispatch
    }

    /// Candidates per frame.
    pub fn batch_capacity(&self) -> usize {
        self.dispatch.batch_capacity()
    }

    /// Bytes of one frame's candidate buffer.
    pub fn frame_byte_size(&self) -> u64 {
        (self.batch_capacity() * RECORD_SIZE) as u64
    }

    /// Whether the selected adapter is a CPU device.
    pub fn is_cpu_device(&self) -> bool {
        self.is_cpu
    }

    /// Whether profiling was requested on this engine.
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    /// Block the host until all submitted device work completes.
    pub fn wait_idle(&self) -> JhResult<()> {
        self.device
            .poll(wgpu::PollType::wait())
            .map(|_| ())
            .map_err(|_| JhError::Submission)
    }

    /// Resolve profiler queries into the command encoder.
    fn profiler_resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        if let Some(p) = &self.profiler {
            p.lock().unwrap().resolve_queries(encoder);
        }
    }

    /// End the profiler frame and collect timing results.
    ///
    /// Returns `None` when profiling is off, timestamps are unsupported,
    /// or no results are ready yet.
    pub fn profiler_end_frame(&self) -> Option<Vec<wgpu_profiler::GpuTimerQueryResult>> {
        let p = self.profiler.as_ref()?;
        {
            p.lock().unwrap().end_frame().ok()?;
        }
        let _ = self.device.poll(wgpu::PollType::wait());
        p.lock()
            .unwrap()
            .process_finished_frame(self.queue.get_timestamp_period())
    }

    /// Write collected profiler results to a Chrome trace file.
    pub fn profiler_write_trace(
        path: &std::path::Path,
        results: &[wgpu_profiler::GpuTimerQueryResult],
    ) -> std::io::Result<()> {
        wgpu_profiler::chrometrace::write_chrometrace(path, results)
    }
}

/// Render a byte count with a binary-size suffix.
pub(crate) fn pretty_bytes(bytes: u64) -> String {
    const LABELS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut suffix = 0;
    while value > 1024.0 && suffix + 1 < LABELS.len() {
        value /= 1024.0;
        suffix += 1;
    }
    format!("{value:.1} {}", LABELS[suffix])
}

/// Shared engine for tests, so every `#[test]` does not pay adapter and
/// pipeline setup separately. `None` when no device is available.
#[cfg(test)]
pub(crate) fn test_engine() -> Option<&'static GpuEngine> {
    static ENGINE: std::sync::OnceLock<Option<GpuEngine>> = std::sync::OnceLock::new();
    ENGINE
        .get_or_init(|| GpuEngine::new(DispatchConfig::default()).ok())
        .as_ref()
}
