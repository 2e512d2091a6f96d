use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::Error;

/// Name of the animation used by empty track entries.
pub const EMPTY_ANIMATION_NAME: &str = "<empty>";

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit: Inherit,
    pub skin_required: bool,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            inherit: Inherit::Normal,
            skin_required: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Inherit {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub has_dark: bool,
    pub dark_color: [f32; 3],
    pub blend: BlendMode,
}

impl SlotData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        Self {
            name: name.into(),
            bone,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            has_dark: false,
            dark_color: [0.0, 0.0, 0.0],
            blend: BlendMode::Normal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

/// Setup values of an IK constraint. Only the mix state is animated here; solving is left
/// to the host.
#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub mix: f32,
    pub softness: f32,
    pub compress: bool,
    pub stretch: bool,
    pub bend_direction: i32,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

/// Interpolation between a keyframe and the next one.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Curve {
    Linear,
    Stepped,
    Bezier(BezierCurve),
}

impl Curve {
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        Self::Bezier(BezierCurve::new(cx1, cy1, cx2, cy2))
    }

    /// Maps the normalized time `t` in `[0, 1]` between two keys to an interpolation
    /// percent.
    pub fn percent(&self, t: f32) -> f32 {
        match self {
            Curve::Linear => t,
            Curve::Stepped => 0.0,
            Curve::Bezier(bezier) => bezier.percent(t),
        }
    }
}

const BEZIER_SIZE: usize = 18;

/// A cubic bezier from (0,0) to (1,1), sampled into nine segments.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BezierCurve {
    cx1: f32,
    cy1: f32,
    cx2: f32,
    cy2: f32,
    points: [f32; BEZIER_SIZE],
}

impl BezierCurve {
    pub fn new(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let cx1 = cx1.clamp(0.0, 1.0);
        let cx2 = cx2.clamp(0.0, 1.0);

        let tmpx = (-cx1 * 2.0 + cx2) * 0.03;
        let tmpy = (-cy1 * 2.0 + cy2) * 0.03;
        let dddx = ((cx1 - cx2) * 3.0 + 1.0) * 0.006;
        let dddy = ((cy1 - cy2) * 3.0 + 1.0) * 0.006;
        let mut ddx = tmpx * 2.0 + dddx;
        let mut ddy = tmpy * 2.0 + dddy;
        let mut dx = cx1 * 0.3 + tmpx + dddx * 0.16666667;
        let mut dy = cy1 * 0.3 + tmpy + dddy * 0.16666667;

        let mut x = dx;
        let mut y = dy;

        let mut points = [0.0f32; BEZIER_SIZE];
        for i in (0..BEZIER_SIZE).step_by(2) {
            points[i] = x;
            points[i + 1] = y;
            dx += ddx;
            dy += ddy;
            ddx += dddx;
            ddy += dddy;
            x += dx;
            y += dy;
        }

        Self {
            cx1,
            cy1,
            cx2,
            cy2,
            points,
        }
    }

    pub fn control_points(&self) -> [f32; 4] {
        [self.cx1, self.cy1, self.cx2, self.cy2]
    }

    pub fn percent(&self, t: f32) -> f32 {
        let points = &self.points;
        if points[0] > t {
            return segment(0.0, 0.0, points[0], points[1], t);
        }
        for i in (2..BEZIER_SIZE).step_by(2) {
            if points[i] >= t {
                return segment(points[i - 2], points[i - 1], points[i], points[i + 1], t);
            }
        }
        segment(
            points[BEZIER_SIZE - 2],
            points[BEZIER_SIZE - 1],
            1.0,
            1.0,
            t,
        )
    }
}

fn segment(x1: f32, y1: f32, x2: f32, y2: f32, t: f32) -> f32 {
    let denom = x2 - x1;
    if denom.abs() <= 1.0e-12 {
        return y1;
    }
    y1 + (t - x1) / denom * (y2 - y1)
}

#[derive(Clone, Debug)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curve: [Curve; 2],
}

#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Clone, Debug)]
pub struct TransformFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub curve: [Curve; 6],
}

#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<TransformFrame>,
}

#[derive(Clone, Debug)]
pub struct FloatFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathConstraintPositionTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathConstraintSpacingTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathMixFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub curve: [Curve; 3],
}

#[derive(Clone, Debug)]
pub struct PathConstraintMixTimeline {
    pub constraint_index: usize,
    pub frames: Vec<PathMixFrame>,
}

#[derive(Clone, Debug)]
pub enum PathConstraintTimeline {
    Position(PathConstraintPositionTimeline),
    Spacing(PathConstraintSpacingTimeline),
    Mix(PathConstraintMixTimeline),
}

#[derive(Clone, Debug)]
pub struct RegionAttachmentData {
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    /// Texture coordinates in BR, BL, UL, UR order.
    pub uvs: [[f32; 2]; 4],
}

impl RegionAttachmentData {
    pub fn new(name: impl Into<String>, width: f32, height: f32) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            color: [1.0, 1.0, 1.0, 1.0],
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            width,
            height,
            uvs: [[1.0, 1.0], [0.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
        }
    }
}

/// A mesh that shares its parent's topology. Deform timelines keyed on the parent apply
/// to this mesh when `inherit_timelines` is set.
#[derive(Clone, Debug)]
pub struct LinkedMesh {
    pub parent: String,
    /// Skin holding the parent. `None` means the skin this mesh lives in.
    pub skin: Option<String>,
    pub inherit_timelines: bool,
}

#[derive(Clone, Debug)]
pub struct MeshAttachmentData {
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    pub vertices: MeshVertices,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u32>,
    pub linked: Option<LinkedMesh>,
}

#[derive(Clone, Debug)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
pub enum MeshVertices {
    Unweighted(Vec<[f32; 2]>),
    Weighted(Vec<Vec<VertexWeight>>),
}

impl MeshVertices {
    pub fn len(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len(),
            MeshVertices::Weighted(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of floats a deform buffer for these vertices holds.
    pub fn deform_len(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len() * 2,
            MeshVertices::Weighted(v) => v.iter().map(|w| w.len() * 2).sum(),
        }
    }

    /// Setup positions flattened to `[x0, y0, x1, y1, ..]`, for unweighted vertices only.
    pub fn setup_positions(&self) -> Option<Vec<f32>> {
        match self {
            MeshVertices::Unweighted(v) => Some(v.iter().flat_map(|p| [p[0], p[1]]).collect()),
            MeshVertices::Weighted(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PointAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Clone, Debug)]
pub struct PathAttachmentData {
    pub name: String,
    pub vertices: MeshVertices,
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachmentData {
    pub name: String,
    pub vertices: MeshVertices,
}

#[derive(Clone, Debug)]
pub struct ClippingAttachmentData {
    pub name: String,
    pub vertices: MeshVertices,
}

/// A nested skeleton rendered in place of a slot attachment.
#[derive(Clone, Debug)]
pub struct SkeletonAttachmentData {
    pub name: String,
    pub skeleton: Arc<SkeletonData>,
}

#[derive(Clone, Debug)]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    Point(PointAttachmentData),
    Path(PathAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Clipping(ClippingAttachmentData),
    Skeleton(SkeletonAttachmentData),
}

impl AttachmentData {
    pub fn name(&self) -> &str {
        match self {
            AttachmentData::Region(a) => a.name.as_str(),
            AttachmentData::Mesh(a) => a.name.as_str(),
            AttachmentData::Point(a) => a.name.as_str(),
            AttachmentData::Path(a) => a.name.as_str(),
            AttachmentData::BoundingBox(a) => a.name.as_str(),
            AttachmentData::Clipping(a) => a.name.as_str(),
            AttachmentData::Skeleton(a) => a.name.as_str(),
        }
    }

    /// Vertices of attachments that deform timelines can target.
    pub fn vertices(&self) -> Option<&MeshVertices> {
        match self {
            AttachmentData::Mesh(a) => Some(&a.vertices),
            AttachmentData::Path(a) => Some(&a.vertices),
            AttachmentData::BoundingBox(a) => Some(&a.vertices),
            AttachmentData::Clipping(a) => Some(&a.vertices),
            AttachmentData::Region(_) | AttachmentData::Point(_) | AttachmentData::Skeleton(_) => {
                None
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SkinData {
    pub name: String,
    pub attachments: Vec<HashMap<String, AttachmentData>>,
    pub bones: Vec<usize>,
    pub ik_constraints: Vec<usize>,
    pub transform_constraints: Vec<usize>,
    pub path_constraints: Vec<usize>,
}

impl SkinData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }

    /// Stores `attachment` under `key` for the slot, replacing any previous entry.
    pub fn set_attachment(
        &mut self,
        slot_index: usize,
        key: impl Into<String>,
        attachment: AttachmentData,
    ) {
        if self.attachments.len() <= slot_index {
            self.attachments.resize_with(slot_index + 1, HashMap::new);
        }
        self.attachments[slot_index].insert(key.into(), attachment);
    }
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string: String::new(),
            audio_path: String::new(),
            volume: 1.0,
            balance: 0.0,
        }
    }
}

/// A keyed event. `time` is in animation-local seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
    pub audio_path: String,
    pub volume: f32,
    pub balance: f32,
}

impl Event {
    pub fn new(time: f32, data: &EventData) -> Self {
        Self {
            time,
            name: data.name.clone(),
            int_value: data.int_value,
            float_value: data.float_value,
            string: data.string.clone(),
            audio_path: data.audio_path.clone(),
            volume: data.volume,
            balance: data.balance,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct DeformFrame {
    pub time: f32,
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

/// Keyed vertex positions for one attachment.
///
/// `setup_vertices` holds the unweighted setup positions; when present, frame values are
/// absolute positions, otherwise they are offsets from the weighted setup.
#[derive(Clone, Debug)]
pub struct DeformTimeline {
    pub skin: String,
    pub slot_index: usize,
    pub attachment: String,
    pub vertex_count: usize,
    pub setup_vertices: Option<Vec<f32>>,
    pub frames: Vec<DeformFrame>,
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    pub draw_order_to_setup_index: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: [Curve; 4],
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
pub struct RgbFrame {
    pub time: f32,
    pub color: [f32; 3],
    pub curve: [Curve; 3],
}

#[derive(Clone, Debug)]
pub struct RgbTimeline {
    pub slot_index: usize,
    pub frames: Vec<RgbFrame>,
}

#[derive(Clone, Debug)]
pub struct AlphaFrame {
    pub time: f32,
    pub alpha: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct AlphaTimeline {
    pub slot_index: usize,
    pub frames: Vec<AlphaFrame>,
}

#[derive(Clone, Debug)]
pub struct Rgba2Frame {
    pub time: f32,
    pub light: [f32; 4],
    pub dark: [f32; 3],
    pub curve: [Curve; 7],
}

#[derive(Clone, Debug)]
pub struct Rgba2Timeline {
    pub slot_index: usize,
    pub frames: Vec<Rgba2Frame>,
}

#[derive(Clone, Debug)]
pub struct Rgb2Frame {
    pub time: f32,
    pub light: [f32; 3],
    pub dark: [f32; 3],
    pub curve: [Curve; 6],
}

#[derive(Clone, Debug)]
pub struct Rgb2Timeline {
    pub slot_index: usize,
    pub frames: Vec<Rgb2Frame>,
}

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: [Curve; 2],
}

#[derive(Clone, Debug)]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct TranslateXTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct TranslateYTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

/// Scale values are multipliers of the setup scale.
#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ScaleXTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct ScaleYTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct ShearTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ShearXTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct ShearYTimeline {
    pub bone_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub enum BoneTimeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    TranslateX(TranslateXTimeline),
    TranslateY(TranslateYTimeline),
    Scale(ScaleTimeline),
    ScaleX(ScaleXTimeline),
    ScaleY(ScaleYTimeline),
    Shear(ShearTimeline),
    ShearX(ShearXTimeline),
    ShearY(ShearYTimeline),
}

#[derive(Clone, Debug)]
pub enum Timeline {
    Bone(BoneTimeline),
    Attachment(AttachmentTimeline),
    Color(ColorTimeline),
    Rgb(RgbTimeline),
    Alpha(AlphaTimeline),
    Rgba2(Rgba2Timeline),
    Rgb2(Rgb2Timeline),
    Deform(DeformTimeline),
    DrawOrder(DrawOrderTimeline),
    Event(EventTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathConstraint(PathConstraintTimeline),
}

/// A skeleton property written by a timeline. Two timelines conflict when they share one.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Property {
    Rotate(usize),
    X(usize),
    Y(usize),
    ScaleX(usize),
    ScaleY(usize),
    ShearX(usize),
    ShearY(usize),
    Rgb(usize),
    Alpha(usize),
    Rgb2(usize),
    Attachment(usize),
    Deform { slot: usize, attachment: String },
    Event,
    DrawOrder,
    IkConstraint(usize),
    TransformConstraint(usize),
    PathConstraintPosition(usize),
    PathConstraintSpacing(usize),
    PathConstraintMix(usize),
}

impl Timeline {
    pub fn property_ids(&self) -> Vec<Property> {
        match self {
            Timeline::Bone(t) => match t {
                BoneTimeline::Rotate(t) => vec![Property::Rotate(t.bone_index)],
                BoneTimeline::Translate(t) => {
                    vec![Property::X(t.bone_index), Property::Y(t.bone_index)]
                }
                BoneTimeline::TranslateX(t) => vec![Property::X(t.bone_index)],
                BoneTimeline::TranslateY(t) => vec![Property::Y(t.bone_index)],
                BoneTimeline::Scale(t) => vec![
                    Property::ScaleX(t.bone_index),
                    Property::ScaleY(t.bone_index),
                ],
                BoneTimeline::ScaleX(t) => vec![Property::ScaleX(t.bone_index)],
                BoneTimeline::ScaleY(t) => vec![Property::ScaleY(t.bone_index)],
                BoneTimeline::Shear(t) => vec![
                    Property::ShearX(t.bone_index),
                    Property::ShearY(t.bone_index),
                ],
                BoneTimeline::ShearX(t) => vec![Property::ShearX(t.bone_index)],
                BoneTimeline::ShearY(t) => vec![Property::ShearY(t.bone_index)],
            },
            Timeline::Attachment(t) => vec![Property::Attachment(t.slot_index)],
            Timeline::Color(t) => vec![Property::Rgb(t.slot_index), Property::Alpha(t.slot_index)],
            Timeline::Rgb(t) => vec![Property::Rgb(t.slot_index)],
            Timeline::Alpha(t) => vec![Property::Alpha(t.slot_index)],
            Timeline::Rgba2(t) => vec![
                Property::Rgb(t.slot_index),
                Property::Alpha(t.slot_index),
                Property::Rgb2(t.slot_index),
            ],
            Timeline::Rgb2(t) => vec![Property::Rgb(t.slot_index), Property::Rgb2(t.slot_index)],
            Timeline::Deform(t) => vec![Property::Deform {
                slot: t.slot_index,
                attachment: t.attachment.clone(),
            }],
            Timeline::DrawOrder(_) => vec![Property::DrawOrder],
            Timeline::Event(_) => vec![Property::Event],
            Timeline::IkConstraint(t) => vec![Property::IkConstraint(t.constraint_index)],
            Timeline::TransformConstraint(t) => {
                vec![Property::TransformConstraint(t.constraint_index)]
            }
            Timeline::PathConstraint(t) => match t {
                PathConstraintTimeline::Position(t) => {
                    vec![Property::PathConstraintPosition(t.constraint_index)]
                }
                PathConstraintTimeline::Spacing(t) => {
                    vec![Property::PathConstraintSpacing(t.constraint_index)]
                }
                PathConstraintTimeline::Mix(t) => {
                    vec![Property::PathConstraintMix(t.constraint_index)]
                }
            },
        }
    }

    pub fn frame_times(&self) -> Vec<f32> {
        fn times<F>(frames: &[F], time: impl Fn(&F) -> f32) -> Vec<f32> {
            frames.iter().map(time).collect()
        }
        match self {
            Timeline::Bone(t) => match t {
                BoneTimeline::Rotate(t) => times(&t.frames, |f| f.time),
                BoneTimeline::Translate(t) => times(&t.frames, |f| f.time),
                BoneTimeline::TranslateX(t) => times(&t.frames, |f| f.time),
                BoneTimeline::TranslateY(t) => times(&t.frames, |f| f.time),
                BoneTimeline::Scale(t) => times(&t.frames, |f| f.time),
                BoneTimeline::ScaleX(t) => times(&t.frames, |f| f.time),
                BoneTimeline::ScaleY(t) => times(&t.frames, |f| f.time),
                BoneTimeline::Shear(t) => times(&t.frames, |f| f.time),
                BoneTimeline::ShearX(t) => times(&t.frames, |f| f.time),
                BoneTimeline::ShearY(t) => times(&t.frames, |f| f.time),
            },
            Timeline::Attachment(t) => times(&t.frames, |f| f.time),
            Timeline::Color(t) => times(&t.frames, |f| f.time),
            Timeline::Rgb(t) => times(&t.frames, |f| f.time),
            Timeline::Alpha(t) => times(&t.frames, |f| f.time),
            Timeline::Rgba2(t) => times(&t.frames, |f| f.time),
            Timeline::Rgb2(t) => times(&t.frames, |f| f.time),
            Timeline::Deform(t) => times(&t.frames, |f| f.time),
            Timeline::DrawOrder(t) => times(&t.frames, |f| f.time),
            Timeline::Event(t) => times(&t.events, |e| e.time),
            Timeline::IkConstraint(t) => times(&t.frames, |f| f.time),
            Timeline::TransformConstraint(t) => times(&t.frames, |f| f.time),
            Timeline::PathConstraint(t) => match t {
                PathConstraintTimeline::Position(t) => times(&t.frames, |f| f.time),
                PathConstraintTimeline::Spacing(t) => times(&t.frames, |f| f.time),
                PathConstraintTimeline::Mix(t) => times(&t.frames, |f| f.time),
            },
        }
    }

    pub(crate) fn is_attachment(&self) -> bool {
        matches!(self, Timeline::Attachment(_))
    }

    pub(crate) fn is_draw_order(&self) -> bool {
        matches!(self, Timeline::DrawOrder(_))
    }

    fn validate(&self, animation: &str) -> Result<(), Error> {
        let times = self.frame_times();
        if times.is_empty() {
            return Err(Error::invalid(format!(
                "animation '{animation}' has a timeline without frames"
            )));
        }
        // Several events may share a key time.
        let strict = !matches!(self, Timeline::Event(_));
        for pair in times.windows(2) {
            let ordered = if strict {
                pair[0] < pair[1]
            } else {
                pair[0] <= pair[1]
            };
            if !ordered {
                return Err(Error::invalid(format!(
                    "animation '{animation}' has out-of-order frame times {} and {}",
                    pair[0], pair[1]
                )));
            }
        }
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(Error::invalid(format!(
                "animation '{animation}' has a negative or non-finite frame time"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    timelines: Vec<Timeline>,
    properties: HashSet<Property>,
}

impl Animation {
    pub fn new(
        name: impl Into<String>,
        duration: f32,
        timelines: Vec<Timeline>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid("animation name must not be empty"));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::invalid(format!(
                "animation '{name}' has invalid duration {duration}"
            )));
        }
        for timeline in &timelines {
            timeline.validate(&name)?;
        }
        let properties = timelines
            .iter()
            .flat_map(Timeline::property_ids)
            .collect::<HashSet<_>>();
        Ok(Self {
            name,
            duration,
            timelines,
            properties,
        })
    }

    pub fn empty() -> Self {
        Self {
            name: EMPTY_ANIMATION_NAME.to_string(),
            duration: 0.0,
            timelines: Vec::new(),
            properties: HashSet::new(),
        }
    }

    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    pub fn has_property(&self, property: &Property) -> bool {
        self.properties.contains(property)
    }
}

#[derive(Clone, Debug)]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: HashMap<String, SkinData>,
    pub events: HashMap<String, EventData>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
    animations: Vec<Arc<Animation>>,
    animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn new(bones: Vec<BoneData>, slots: Vec<SlotData>) -> Result<Self, Error> {
        for (index, bone) in bones.iter().enumerate() {
            if bone.name.is_empty() {
                return Err(Error::invalid(format!("bone {index} has an empty name")));
            }
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(Error::invalid(format!(
                        "bone '{}' has parent index {parent}, which does not precede it",
                        bone.name
                    )));
                }
            }
        }
        if bones.first().is_some_and(|b| b.parent.is_some()) {
            return Err(Error::invalid("the first bone must be the root"));
        }
        for slot in &slots {
            if slot.name.is_empty() {
                return Err(Error::invalid("slot name must not be empty"));
            }
            if slot.bone >= bones.len() {
                return Err(Error::invalid(format!(
                    "slot '{}' references missing bone {}",
                    slot.name, slot.bone
                )));
            }
        }
        Ok(Self {
            bones,
            slots,
            skins: HashMap::new(),
            events: HashMap::new(),
            ik_constraints: Vec::new(),
            transform_constraints: Vec::new(),
            path_constraints: Vec::new(),
            animations: Vec::new(),
            animation_index: HashMap::new(),
        })
    }

    /// Registers an animation, replacing any animation with the same name. Returns its index.
    pub fn add_animation(&mut self, animation: Animation) -> usize {
        let animation = Arc::new(animation);
        if let Some(&index) = self.animation_index.get(animation.name.as_str()) {
            self.animations[index] = animation;
            return index;
        }
        let index = self.animations.len();
        self.animation_index.insert(animation.name.clone(), index);
        self.animations.push(animation);
        index
    }

    pub fn add_skin(&mut self, skin: SkinData) -> Result<(), Error> {
        if skin.name.is_empty() {
            return Err(Error::invalid("skin name must not be empty"));
        }
        if skin.attachments.len() > self.slots.len() {
            return Err(Error::invalid(format!(
                "skin '{}' has attachments for {} slots but the skeleton has {}",
                skin.name,
                skin.attachments.len(),
                self.slots.len()
            )));
        }
        self.skins.insert(skin.name.clone(), skin);
        Ok(())
    }

    pub fn add_event(&mut self, event: EventData) {
        self.events.insert(event.name.clone(), event);
    }

    pub fn animations(&self) -> &[Arc<Animation>] {
        &self.animations
    }

    pub fn animation(&self, name: &str) -> Option<(usize, &Arc<Animation>)> {
        let index = *self.animation_index.get(name)?;
        Some((index, &self.animations[index]))
    }

    pub(crate) fn animation_position(&self, animation: &Arc<Animation>) -> Option<usize> {
        self.animation_index
            .get(animation.name.as_str())
            .copied()
            .filter(|&i| Arc::ptr_eq(&self.animations[i], animation))
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn default_skin(&self) -> Option<&SkinData> {
        self.skins.get("default")
    }

    pub fn event(&self, name: &str) -> Option<&EventData> {
        self.events.get(name)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}
