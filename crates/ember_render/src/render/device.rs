//! Device context and render target contracts
//!
//! The engine does not bootstrap Vulkan itself. The application hands it a
//! [`DeviceContext`] built from its own instance/device setup and a
//! [`RenderTarget`] describing the current swapchain state.

use crate::render::{RenderError, RenderResult};
use ash::{vk, Device, Instance};

/// Round `size` up to the next multiple of `alignment`.
///
/// Alignment 0 means "no alignment requirement" and returns `size`
/// unchanged. Uniform sizes are padded once, at declaration time, so later
/// aggregation never re-derives alignment.
pub fn pad_uniform_buffer_size(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return size;
    }
    (size + alignment - 1) & !(alignment - 1)
}

/// Device-level services the engine consumes.
///
/// Owns clones of the `ash` handles (cheap, internally ref-counted) plus the
/// transfer queue and command pool used for one-off copies. Construction and
/// destruction of the underlying device belong to the application.
pub struct DeviceContext {
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    transfer_queue: vk::Queue,
    command_pool: vk::CommandPool,
    min_uniform_alignment: vk::DeviceSize,
}

impl DeviceContext {
    /// Assemble a context from handles owned by the application bootstrap.
    pub fn new(
        device: Device,
        instance: Instance,
        physical_device: vk::PhysicalDevice,
        transfer_queue: vk::Queue,
        command_pool: vk::CommandPool,
    ) -> Self {
        let limits = unsafe {
            instance
                .get_physical_device_properties(physical_device)
                .limits
        };
        log::debug!(
            "DeviceContext created (min uniform alignment = {})",
            limits.min_uniform_buffer_offset_alignment
        );
        Self {
            device,
            instance,
            physical_device,
            transfer_queue,
            command_pool,
            min_uniform_alignment: limits.min_uniform_buffer_offset_alignment,
        }
    }

    /// The logical device handle.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The instance handle.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The physical device this context was built for.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Minimum uniform-buffer offset alignment reported by the device.
    pub fn min_uniform_alignment(&self) -> vk::DeviceSize {
        self.min_uniform_alignment
    }

    /// Pad `size` to this device's uniform-buffer offset alignment.
    pub fn pad_uniform_buffer_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        pad_uniform_buffer_size(size, self.min_uniform_alignment)
    }

    /// Find a memory type satisfying `type_filter` and `properties`.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<u32> {
        let mem_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };

        for i in 0..mem_properties.memory_type_count {
            if (type_filter & (1 << i)) != 0
                && (mem_properties.memory_types[i as usize].property_flags & properties)
                    == properties
            {
                return Ok(i);
            }
        }

        Err(RenderError::NoSuitableMemoryType)
    }

    /// Record and submit a one-off command buffer, waiting for completion.
    ///
    /// Used for buffer-to-buffer copies during static mesh upload. Blocks on
    /// the transfer queue; not a per-frame path.
    pub fn with_single_time_commands<F>(&self, record: F) -> RenderResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(RenderError::Api)?[0]
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(RenderError::Api)?;
        }

        record(command_buffer);

        let result = unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(RenderError::Api)
                .and_then(|()| {
                    let command_buffers = [command_buffer];
                    let submit_info = vk::SubmitInfo::builder()
                        .command_buffers(&command_buffers)
                        .build();
                    self.device
                        .queue_submit(self.transfer_queue, &[submit_info], vk::Fence::null())
                        .map_err(RenderError::Api)?;
                    self.device
                        .queue_wait_idle(self.transfer_queue)
                        .map_err(RenderError::Api)
                })
        };

        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer]);
        }

        result
    }

    /// Copy `size` bytes between buffers through a single-time command.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RenderResult<()> {
        self.with_single_time_commands(|cmd| {
            let region = vk::BufferCopy::builder().size(size).build();
            unsafe {
                self.device.cmd_copy_buffer(cmd, src, dst, &[region]);
            }
        })
    }
}

/// Swapchain-derived state a pipeline build needs.
///
/// Re-created by the application after swapchain invalidation (resize) and
/// passed back through `recreate_materials`.
#[derive(Clone, Copy)]
pub struct RenderTarget {
    /// Render pass the pipelines render into
    pub render_pass: vk::RenderPass,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
    /// Number of frames in flight (per-frame buffer replication factor)
    pub frames_in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_alignment() {
        assert_eq!(pad_uniform_buffer_size(64, 256), 256);
        assert_eq!(pad_uniform_buffer_size(16, 256), 256);
        assert_eq!(pad_uniform_buffer_size(256, 256), 256);
        assert_eq!(pad_uniform_buffer_size(257, 256), 512);
        assert_eq!(pad_uniform_buffer_size(1, 64), 64);
    }

    #[test]
    fn zero_alignment_is_identity() {
        assert_eq!(pad_uniform_buffer_size(0, 0), 0);
        assert_eq!(pad_uniform_buffer_size(37, 0), 37);
    }

    #[test]
    fn padded_size_is_smallest_sufficient_multiple() {
        for alignment in [16u64, 64, 256] {
            for size in [1u64, 15, 16, 100, 255, 256, 1000] {
                let padded = pad_uniform_buffer_size(size, alignment);
                assert!(padded >= size);
                assert_eq!(padded % alignment, 0);
                assert!(padded - size < alignment);
            }
        }
    }
}
