//! World-space geometry for a posed skeleton, in draw order.

use crate::runtime::Bone;
use crate::{AttachmentData, BlendMode, RegionAttachmentData, Skeleton, Slot};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub dark_color: [f32; 4],
}

/// A run of indices sharing one texture path and blend mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Draw {
    pub texture_path: String,
    pub blend: BlendMode,
    pub first_index: usize,
    pub index_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub draws: Vec<Draw>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.draws.clear();
    }
}

/// Axis-aligned bounds of every visible region and mesh.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

const REGION_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

pub fn build_draw_list(skeleton: &Skeleton) -> DrawList {
    let mut out = DrawList::default();
    append_draw_list(&mut out, skeleton);
    out
}

/// Appends the skeleton's region and mesh attachments to `out`. Slots with zero alpha, or
/// whose bone is inactive, are skipped.
pub fn append_draw_list(out: &mut DrawList, skeleton: &Skeleton) {
    for &slot_index in &skeleton.draw_order {
        let Some(slot) = skeleton.slots.get(slot_index) else {
            continue;
        };
        let Some(bone) = skeleton.bones.get(slot.bone) else {
            continue;
        };
        if slot.color[3] <= 0.0 || !bone.active {
            continue;
        }
        let Some(attachment) = skeleton.slot_attachment_data(slot_index) else {
            continue;
        };

        match attachment {
            AttachmentData::Region(region) => {
                if region.color[3] <= 0.0 {
                    continue;
                }
                let world = region_world_vertices(region, bone);
                let color = multiply_rgba(multiply_rgba(skeleton.color, slot.color), region.color);
                let dark_color = slot_dark_color(slot);
                let vertices = world
                    .iter()
                    .zip(region.uvs)
                    .map(|(position, uv)| Vertex {
                        position: *position,
                        uv,
                        color,
                        dark_color,
                    });
                append_indexed(out, &region.path, slot.blend, vertices, &REGION_INDICES);
            }
            AttachmentData::Mesh(mesh) => {
                if mesh.color[3] <= 0.0 || mesh.triangles.is_empty() {
                    continue;
                }
                let Some(world) = skeleton.vertex_attachment_world_vertices(slot_index) else {
                    continue;
                };
                if mesh.uvs.len() * 2 != world.len() {
                    log::warn!(
                        "mesh '{}' has {} uvs for {} vertices",
                        mesh.name,
                        mesh.uvs.len(),
                        world.len() / 2
                    );
                    continue;
                }
                let color = multiply_rgba(multiply_rgba(skeleton.color, slot.color), mesh.color);
                let dark_color = slot_dark_color(slot);
                let vertices = world
                    .chunks_exact(2)
                    .zip(mesh.uvs.iter())
                    .map(|(position, uv)| Vertex {
                        position: [position[0], position[1]],
                        uv: *uv,
                        color,
                        dark_color,
                    });
                append_indexed(out, &mesh.path, slot.blend, vertices, &mesh.triangles);
            }
            AttachmentData::Point(_)
            | AttachmentData::Path(_)
            | AttachmentData::BoundingBox(_)
            | AttachmentData::Clipping(_)
            | AttachmentData::Skeleton(_) => {}
        }
    }
}

fn append_indexed(
    out: &mut DrawList,
    texture_path: &str,
    blend: BlendMode,
    vertices: impl Iterator<Item = Vertex>,
    indices: &[u32],
) {
    let base = out.vertices.len() as u32;
    out.vertices.extend(vertices);

    let first_index = out.indices.len();
    out.indices.extend(indices.iter().map(|&i| base + i));

    if let Some(last) = out.draws.last_mut() {
        if last.texture_path == texture_path
            && last.blend == blend
            && last.first_index + last.index_count == first_index
        {
            last.index_count += indices.len();
            return;
        }
    }

    out.draws.push(Draw {
        texture_path: texture_path.to_string(),
        blend,
        first_index,
        index_count: indices.len(),
    });
}

/// Corners of a region attachment in world space, in the same BR, BL, UL, UR order as
/// [`RegionAttachmentData::uvs`].
pub fn region_world_vertices(region: &RegionAttachmentData, bone: &Bone) -> [[f32; 2]; 4] {
    let half_width = region.width * 0.5 * region.scale_x;
    let half_height = region.height * 0.5 * region.scale_y;
    let (sin, cos) = region.rotation.to_radians().sin_cos();
    let corner = |lx: f32, ly: f32| {
        let x = lx * cos - ly * sin + region.x;
        let y = lx * sin + ly * cos + region.y;
        bone.local_to_world(x, y)
    };
    [
        corner(half_width, -half_height),
        corner(-half_width, -half_height),
        corner(-half_width, half_height),
        corner(half_width, half_height),
    ]
}

fn multiply_rgba(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]]
}

/// Straight-alpha two-color tint: `(0, 0, 0, 1)` disables the dark term in the shader.
fn slot_dark_color(slot: &Slot) -> [f32; 4] {
    if !slot.has_dark {
        return [0.0, 0.0, 0.0, 1.0];
    }
    [slot.dark_color[0], slot.dark_color[1], slot.dark_color[2], 0.0]
}

impl Skeleton {
    /// World-space bounds of the visible region and mesh attachments, or `None` when
    /// nothing is visible.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut min = [f32::MAX, f32::MAX];
        let mut max = [f32::MIN, f32::MIN];
        let mut any = false;
        let mut include = |x: f32, y: f32| {
            min = [min[0].min(x), min[1].min(y)];
            max = [max[0].max(x), max[1].max(y)];
            any = true;
        };

        for &slot_index in &self.draw_order {
            let Some(slot) = self.slots.get(slot_index) else {
                continue;
            };
            let Some(bone) = self.bones.get(slot.bone) else {
                continue;
            };
            if !bone.active {
                continue;
            }
            match self.slot_attachment_data(slot_index) {
                Some(AttachmentData::Region(region)) => {
                    for [x, y] in region_world_vertices(region, bone) {
                        include(x, y);
                    }
                }
                Some(AttachmentData::Mesh(_)) => {
                    if let Some(world) = self.vertex_attachment_world_vertices(slot_index) {
                        for p in world.chunks_exact(2) {
                            include(p[0], p[1]);
                        }
                    }
                }
                _ => {}
            }
        }

        any.then(|| Bounds {
            x: min[0],
            y: min[1],
            width: max[0] - min[0],
            height: max[1] - min[1],
        })
    }
}
