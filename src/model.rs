use crate::buffer::*;
use crate::util::cast_slice;
use crate::vulkan::DEVICE;
use crate::*;
use ash::vk;
use std::collections::HashMap;
use std::mem::offset_of;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, pos) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, uv) as u32),
        ]
    }
}

// f32 has no Eq/Hash, dedup on the raw bit patterns instead
#[derive(PartialEq, Eq, Hash)]
struct VertexKey([u32; 8]);

impl From<&Vertex> for VertexKey {
    fn from(vertex: &Vertex) -> Self {
        Self([
            vertex.pos[0].to_bits(),
            vertex.pos[1].to_bits(),
            vertex.pos[2].to_bits(),
            vertex.color[0].to_bits(),
            vertex.color[1].to_bits(),
            vertex.color[2].to_bits(),
            vertex.uv[0].to_bits(),
            vertex.uv[1].to_bits(),
        ])
    }
}

/// Flattens every mesh in an OBJ into one deduplicated vertex/index pair.
/// Position and texcoord index streams are separate in the file, so each
/// face corner pairs `indices[i]` with `texcoord_indices[i]`. Texture V is
/// flipped since OBJ puts 0 at the bottom of the image.
pub fn load_mesh(models: &[tobj::Model]) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut unique: HashMap<VertexKey, u32> = HashMap::new();

    for model in models {
        let mesh = &model.mesh;
        for (corner, &index) in mesh.indices.iter().enumerate() {
            let pos_index = 3 * index as usize;
            let vertex = Vertex {
                pos: [
                    mesh.positions[pos_index],
                    mesh.positions[pos_index + 1],
                    mesh.positions[pos_index + 2],
                ],
                color: [1.0, 1.0, 1.0],
                uv: if mesh.texcoord_indices.is_empty() {
                    [0.0, 0.0]
                } else {
                    let uv_index = 2 * mesh.texcoord_indices[corner] as usize;
                    [mesh.texcoords[uv_index], 1.0 - mesh.texcoords[uv_index + 1]]
                },
            };
            let next_index = vertices.len() as u32;
            let index = *unique.entry(VertexKey::from(&vertex)).or_insert_with(|| {
                vertices.push(vertex);
                next_index
            });
            indices.push(index);
        }
    }

    (vertices, indices)
}

pub struct Model {
    pub vertex_buffer: vk::Buffer,
    pub vertex_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_memory: vk::DeviceMemory,
    pub index_count: u32,
}

impl Model {
    pub fn load(command_pool: vk::CommandPool, path: &str) -> Self {
        scope_time!("load model {path}");
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: false,
                ..Default::default()
            },
        )
        .unwrap_or_else(|e| fatal!("Failed to load model {path}: {e}"));

        let (vertices, indices) = load_mesh(&models);
        info!(
            "Loaded {path}: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        let (vertex_buffer, vertex_memory) = create_device_local_buffer(
            command_pool,
            cast_slice(&vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        );
        let (index_buffer, index_memory) = create_device_local_buffer(
            command_pool,
            cast_slice(&indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        );

        Self {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: indices.len() as u32,
        }
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        unsafe {
            DEVICE.destroy_buffer(self.index_buffer, None);
            DEVICE.free_memory(self.index_memory, None);
            DEVICE.destroy_buffer(self.vertex_buffer, None);
            DEVICE.free_memory(self.vertex_memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_model() -> tobj::Model {
        // two triangles sharing an edge, 6 indices into 4 distinct vertices
        let mesh = tobj::Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            indices: vec![0, 1, 2, 2, 3, 0],
            texcoord_indices: vec![0, 1, 2, 2, 3, 0],
            ..Default::default()
        };
        tobj::Model::new(mesh, "quad".to_string())
    }

    #[test]
    fn shared_vertices_are_deduplicated() {
        let (vertices, indices) = load_mesh(&[quad_model()]);
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn texture_v_is_flipped() {
        let (vertices, _) = load_mesh(&[quad_model()]);
        assert_eq!(vertices[0].uv, [0.0, 1.0]);
        assert_eq!(vertices[2].uv, [1.0, 0.0]);
    }

    #[test]
    fn missing_texcoords_default_to_zero() {
        let mut model = quad_model();
        model.mesh.texcoords.clear();
        model.mesh.texcoord_indices.clear();
        let (vertices, indices) = load_mesh(&[model]);
        assert_eq!(indices.len(), 6);
        assert!(vertices.iter().all(|v| v.uv == [0.0, 0.0]));
    }

    #[test]
    fn texcoord_indices_are_separate_from_position_indices() {
        // three positions all mapped to the single texcoord in the file,
        // so the uv stream cannot be indexed by the position indices
        let mesh = tobj::Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            texcoords: vec![0.5, 0.25],
            indices: vec![0, 1, 2],
            texcoord_indices: vec![0, 0, 0],
            ..Default::default()
        };
        let model = tobj::Model::new(mesh, "tri".to_string());
        let (vertices, indices) = load_mesh(&[model]);
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(vertices.iter().all(|v| v.uv == [0.5, 0.75]));
    }

    #[test]
    fn vertices_default_to_white() {
        let (vertices, _) = load_mesh(&[quad_model()]);
        assert!(vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn attribute_offsets_match_layout() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(Vertex::binding_description().stride, 32);
    }
}
