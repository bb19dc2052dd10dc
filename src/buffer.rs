use crate::vulkan::*;
use ash::vk;

pub fn create_buffer(
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> (vk::Buffer, vk::DeviceMemory) {
    let buffer = unsafe {
        DEVICE
            .create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(size)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                None,
            )
            .unwrap()
    };

    let requirements = unsafe { DEVICE.get_buffer_memory_requirements(buffer) };
    let memory = unsafe {
        DEVICE
            .allocate_memory(
                &vk::MemoryAllocateInfo::default()
                    .allocation_size(requirements.size)
                    .memory_type_index(find_memory_type(
                        requirements.memory_type_bits,
                        properties,
                        &GPU_MEMORY_PROPS,
                    )),
                None,
            )
            .unwrap()
    };
    unsafe { DEVICE.bind_buffer_memory(buffer, memory, 0).unwrap() };

    (buffer, memory)
}

pub fn begin_single_time_commands(command_pool: vk::CommandPool) -> vk::CommandBuffer {
    unsafe {
        let command_buffer = DEVICE
            .allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
            .unwrap()[0];
        DEVICE
            .begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
            .unwrap();
        command_buffer
    }
}

pub fn end_single_time_commands(command_pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
    unsafe {
        DEVICE.end_command_buffer(command_buffer).unwrap();

        let command_buffers = [command_buffer];
        DEVICE
            .queue_submit(
                *QUEUE,
                &[vk::SubmitInfo::default().command_buffers(&command_buffers)],
                vk::Fence::null(),
            )
            .unwrap();
        DEVICE.queue_wait_idle(*QUEUE).unwrap();

        DEVICE.free_command_buffers(command_pool, &command_buffers);
    }
}

pub fn copy_buffer(
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) {
    let command_buffer = begin_single_time_commands(command_pool);
    unsafe {
        DEVICE.cmd_copy_buffer(
            command_buffer,
            src,
            dst,
            &[vk::BufferCopy::default().size(size)],
        );
    }
    end_single_time_commands(command_pool, command_buffer);
}

/// Uploads `bytes` into a fresh device-local buffer through a transient
/// host-visible staging buffer. The upload is complete on return.
pub fn create_device_local_buffer(
    command_pool: vk::CommandPool,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> (vk::Buffer, vk::DeviceMemory) {
    let size = bytes.len() as vk::DeviceSize;
    let (staging_buffer, staging_memory) = create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    );

    unsafe {
        let data = DEVICE
            .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())
            .unwrap();
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, bytes.len());
        DEVICE.unmap_memory(staging_memory);
    }

    let (buffer, memory) = create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    );
    copy_buffer(command_pool, staging_buffer, buffer, size);

    unsafe {
        DEVICE.destroy_buffer(staging_buffer, None);
        DEVICE.free_memory(staging_memory, None);
    }

    (buffer, memory)
}
