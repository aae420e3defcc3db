use crate::context::SetupError;
use ash::vk;

/// A buffer plus its dedicated memory allocation.
///
/// Plain handles with explicit `destroy`; lifetime is managed by the owner
/// (the frame ring releases slot buffers before the context drops the
/// device).
pub(crate) struct DeviceBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl DeviceBuffer {
    pub fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, SetupError> {
        let buffer_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let Some(memory_type_index) =
            find_memory_type(mem_props, requirements.memory_type_bits, flags)
        else {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(SetupError::NoMemoryType);
        };

        let alloc_info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: requirements.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };
        unsafe { device.bind_buffer_memory(buffer, memory, 0)? };

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Map the whole allocation for host writes.
    pub fn map(&self, device: &ash::Device) -> Result<*mut u8, SetupError> {
        let ptr = unsafe {
            device.map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
        };
        Ok(ptr.cast())
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Pick the first memory type allowed by `type_bits` that carries `flags`.
fn find_memory_type(
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem_props.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0 && mem_props.memory_types[i as usize].property_flags.contains(flags)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties::default();
        p.memory_type_count = types.len() as u32;
        for (i, &flags) in types.iter().enumerate() {
            p.memory_types[i].property_flags = flags;
        }
        p
    }

    #[test]
    fn picks_first_compatible_type() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        assert_eq!(
            find_memory_type(&p, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
        assert_eq!(
            find_memory_type(&p, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn respects_type_bits_mask() {
        let p = props(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        assert_eq!(
            find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
    }

    #[test]
    fn no_match_yields_none() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
