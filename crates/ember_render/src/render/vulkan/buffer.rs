//! Buffer allocation and host-visible writes
//!
//! Memory management following RAII patterns with proper allocation and cleanup

use crate::render::device::DeviceContext;
use crate::render::{RenderError, RenderResult};
use ash::{vk, Device};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<Self> {
        let device = ctx.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(RenderError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index =
            ctx.find_memory_type(mem_requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(RenderError::Api)?
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(RenderError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Create a host-visible, host-coherent buffer.
    ///
    /// This is the memory class every per-frame mutable buffer in the engine
    /// uses; writes are plain map/copy/unmap round trips.
    pub fn host_visible(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RenderResult<Self> {
        Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Map a sub-range of the buffer memory for writing
    fn map_region(
        &self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> RenderResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
                .map_err(RenderError::Api)
        }
    }

    /// Unmap previously mapped memory
    fn unmap(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Copy raw bytes into the buffer at `offset`.
    ///
    /// Synchronous host write; the caller is responsible for not touching a
    /// region the GPU may still read for an in-flight frame. A write that
    /// would run past the end of the allocation is rejected.
    pub fn write_region(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RenderResult<()> {
        if offset + bytes.len() as vk::DeviceSize > self.size {
            return Err(RenderError::CapacityExceeded {
                what: "buffer bytes",
                max: self.size as usize,
            });
        }
        let dst = self.map_region(offset, bytes.len() as vk::DeviceSize)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), bytes.len());
        }
        self.unmap();
        Ok(())
    }

    /// Copy a slice of plain data into the buffer from offset 0.
    pub fn write_data<T: Copy>(&self, data: &[T]) -> RenderResult<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
        };
        self.write_region(0, bytes)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
