//! In-flight frame slots and the ring that rotates over them.
//!
//! Each slot owns a host-input staging buffer, a device-local storage
//! buffer and a host-output staging buffer, all sized for one batch of
//! candidate records, plus the bind group that exposes the device
//! buffer to the kernel. Rotating the ring lets the host fill and read
//! one slot while the device is still hashing the others.

use std::sync::mpsc;

use crate::candidate::Candidate;
use crate::source::CandidateSource;
use crate::{JhError, JhResult};

use super::{pretty_bytes, GpuEngine};

type MapReceiver = mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>;

/// Round-robin ring of pre-allocated slots.
///
/// `acquire` hands out slot indices in a fixed cycle, so a slot is
/// revisited exactly `depth` acquisitions after it was last used. That
/// spacing is what keeps at most `depth` batches in flight.
pub struct SlotRing<S> {
    slots: Vec<S>,
    next: usize,
}

impl<S> SlotRing<S> {
    pub(crate) fn new(slots: Vec<S>) -> Self {
        assert!(!slots.is_empty());
        SlotRing { slots, next: 0 }
    }

    /// Acquire the next slot index, advancing the ring pointer.
    pub fn acquire(&mut self) -> usize {
        let idx = self.next;
        self.next = (self.next + 1) % self.slots.len();
        idx
    }

    /// Number of slots in the ring.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, idx: usize) -> &S {
        &self.slots[idx]
    }

    pub fn slot_mut(&mut self, idx: usize) -> &mut S {
        &mut self.slots[idx]
    }
}

/// Ring of hashing frames.
pub type FrameRing = SlotRing<FrameSlot>;

/// Per-slot GPU resources for one in-flight batch.
///
/// The two staging buffers double as the slot's fences: their map-async
/// callbacks fire once the queue is done with each buffer, and the
/// receivers stored here are consumed by the next fill or readback.
pub struct FrameSlot {
    host_input: wgpu::Buffer,
    device_local: wgpu::Buffer,
    host_output: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    byte_size: u64,
    item_count: usize,
    input_mapped: bool,
    input_rx: Option<MapReceiver>,
    output_rx: Option<MapReceiver>,
    in_flight: bool,
}

impl FrameSlot {
    /// Records populated by the most recent fill.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Whether the slot has been submitted and not yet read back.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

impl GpuEngine {
    /// Allocate `frame_count` slots sized for this engine's batch capacity.
    pub fn create_frames(&self, frame_count: u32) -> JhResult<FrameRing> {
        let frame_count = frame_count.max(1);
        let byte_size = self.frame_byte_size();
        if byte_size == 0 || byte_size > self.max_buffer_size {
            return Err(JhError::OutOfMemory);
        }

        eprintln!(
            "[jenhash] allocating {} frames of {} ({} candidates each) on {}",
            frame_count,
            pretty_bytes(byte_size * 3),
            self.batch_capacity(),
            self.device_name()
        );

        let layout = self.pipeline.get_bind_group_layout(0);
        let slots = (0..frame_count)
            .map(|_| {
                // Created mapped so the priming pass can fill it without a
                // map round-trip.
                let host_input = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("frame_host_input"),
                    size: byte_size,
                    usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: true,
                });
                let device_local = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("frame_device_local"),
                    size: byte_size,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                });
                let host_output = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("frame_host_output"),
                    size: byte_size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("frame_bind_group"),
                    layout: &layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: device_local.as_entire_binding(),
                    }],
                });

                FrameSlot {
                    host_input,
                    device_local,
                    host_output,
                    bind_group,
                    byte_size,
                    item_count: 0,
                    input_mapped: true,
                    input_rx: None,
                    output_rx: None,
                    in_flight: false,
                }
            })
            .collect();

        Ok(SlotRing::new(slots))
    }

    /// Fill a slot's host-input buffer from the provider.
    ///
    /// Blocks until the slot's previous upload released the buffer, maps
    /// it, runs the provider over the record slice, and unmaps, which
    /// publishes the writes to the device. Returns the record count.
    pub fn stage_input<P: CandidateSource>(
        &self,
        slot: &mut FrameSlot,
        source: &mut P,
    ) -> JhResult<usize> {
        if !slot.input_mapped {
            let rx = slot.input_rx.take().ok_or(JhError::Submission)?;
            self.wait_map(&rx)?;
            slot.input_mapped = true;
        }

        let written;
        {
            let mut view = slot.host_input.slice(..).get_mapped_range_mut();
            let records: &mut [Candidate] = bytemuck::cast_slice_mut(&mut view[..]);
            written = source.fill(records);
        }
        slot.host_input.unmap();
        slot.input_mapped = false;
        slot.item_count = written;
        Ok(written)
    }

    /// Record and submit the fixed frame sequence for one slot:
    /// upload copy, indirect dispatch, readback copy.
    ///
    /// Both staging mappings are requested immediately after the submit;
    /// their callbacks act as this slot's fence and fire as soon as the
    /// queue is done with each buffer.
    pub fn submit_frame(&self, slot: &mut FrameSlot) -> JhResult<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hash_frame"),
            });

        encoder.copy_buffer_to_buffer(&slot.host_input, 0, &slot.device_local, 0, slot.byte_size);

        let profiler_query = self
            .profiler
            .as_ref()
            .map(|p| p.lock().unwrap().begin_pass_query("lookup3", &mut encoder));
        let timestamp_writes = profiler_query
            .as_ref()
            .and_then(|q| q.compute_pass_timestamp_writes());
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("lookup3"),
                timestamp_writes,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &slot.bind_group, &[]);
            pass.dispatch_workgroups_indirect(&self.indirect_buf, 0);
        }
        if let Some(query) = profiler_query {
            if let Some(p) = &self.profiler {
                p.lock().unwrap().end_query(&mut encoder, query);
            }
        }

        encoder.copy_buffer_to_buffer(&slot.device_local, 0, &slot.host_output, 0, slot.byte_size);

        self.profiler_resolve(&mut encoder);
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        slot.host_output
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        slot.output_rx = Some(rx);

        let (tx, rx) = mpsc::channel();
        slot.host_input
            .slice(..)
            .map_async(wgpu::MapMode::Write, move |result| {
                let _ = tx.send(result);
            });
        slot.input_rx = Some(rx);

        slot.in_flight = true;
        Ok(())
    }

    /// Read back a completed slot and hand its batch to `consume`.
    ///
    /// Blocks on the slot's output fence, exposes exactly the records
    /// populated by the matching fill, then unmaps and marks the slot
    /// reaped.
    pub fn read_output<F: FnOnce(&[Candidate])>(
        &self,
        slot: &mut FrameSlot,
        consume: F,
    ) -> JhResult<()> {
        let rx = slot.output_rx.take().ok_or(JhError::Submission)?;
        self.wait_map(&rx)?;

        {
            let view = slot.host_output.slice(..).get_mapped_range();
            let records: &[Candidate] = bytemuck::cast_slice(&view[..]);
            consume(&records[..slot.item_count]);
        }
        slot.host_output.unmap();
        slot.in_flight = false;
        Ok(())
    }

    /// Block until a map-async callback reports in.
    fn wait_map(&self, rx: &MapReceiver) -> JhResult<()> {
        loop {
            match rx.try_recv() {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(_)) => return Err(JhError::Submission),
                Err(mpsc::TryRecvError::Empty) => {
                    self.device
                        .poll(wgpu::PollType::wait())
                        .map_err(|_| JhError::Submission)?;
                }
                Err(mpsc::TryRecvError::Disconnected) => return Err(JhError::Submission),
            }
        }
    }
}
