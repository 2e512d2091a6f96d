use std::sync::Arc;

use crate::{AttachmentData, Error, Inherit, MeshVertices, SkeletonData};

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub inherit: Inherit,
    pub active: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    pub fn local_to_world(&self, local_x: f32, local_y: f32) -> [f32; 2] {
        [
            self.a * local_x + self.b * local_y + self.world_x,
            self.c * local_x + self.d * local_y + self.world_y,
        ]
    }

    /// Inverse of [`Bone::local_to_world`]. A degenerate world matrix maps every point to
    /// the origin.
    pub fn world_to_local(&self, world_x: f32, world_y: f32) -> [f32; 2] {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= 1.0e-12 {
            return [0.0, 0.0];
        }
        let x = world_x - self.world_x;
        let y = world_y - self.world_y;
        [(x * self.d - y * self.b) / det, (y * self.a - x * self.c) / det]
    }

    pub fn world_to_local_rotation(&self, world_rotation: f32) -> f32 {
        let (sin, cos) = world_rotation.to_radians().sin_cos();
        (self.a * sin - self.c * cos)
            .atan2(self.d * cos - self.b * sin)
            .to_degrees()
            + self.rotation
            - self.shear_x
    }

    pub fn local_to_world_rotation(&self, local_rotation: f32) -> f32 {
        let local_rotation = local_rotation - (self.rotation - self.shear_x);
        let (sin, cos) = local_rotation.to_radians().sin_cos();
        (cos * self.c + sin * self.d)
            .atan2(cos * self.a + sin * self.b)
            .to_degrees()
    }

    #[cfg(feature = "glam")]
    pub fn world_affine(&self) -> glam::Affine2 {
        glam::Affine2::from_cols_array(&[
            self.a,
            self.c,
            self.b,
            self.d,
            self.world_x,
            self.world_y,
        ])
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub mix: f32,
    pub softness: f32,
    pub compress: bool,
    pub stretch: bool,
    pub bend_direction: i32,
    pub active: bool,
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub active: bool,
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub active: bool,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub(crate) attachment: Option<String>,
    pub(crate) attachment_skin: Option<String>,
    pub(crate) attachment_state: i32,
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub has_dark: bool,
    pub dark_color: [f32; 3],
    pub blend: crate::BlendMode,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    /// Key of the current attachment within its skin.
    pub fn attachment_name(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    /// Skin the current attachment was resolved from.
    pub fn attachment_skin(&self) -> Option<&str> {
        self.attachment_skin.as_deref()
    }
}

impl crate::PointAttachmentData {
    pub fn compute_world_position(&self, bone: &Bone) -> [f32; 2] {
        bone.local_to_world(self.x, self.y)
    }

    pub fn compute_world_rotation(&self, bone: &Bone) -> f32 {
        bone.local_to_world_rotation(self.rotation)
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    pub draw_order: Vec<usize>,
    skin: Option<String>,
    pub color: [f32; 4],
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                inherit: bone.inherit,
                active: !bone.skin_required,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                ax: bone.x,
                ay: bone.y,
                arotation: bone.rotation,
                ascale_x: bone.scale_x,
                ascale_y: bone.scale_y,
                ashear_x: bone.shear_x,
                ashear_y: bone.shear_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
            })
            .collect::<Vec<_>>();

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: None,
                attachment_skin: None,
                attachment_state: 0,
                deform: Vec::new(),
                color: slot.color,
                has_dark: slot.has_dark,
                dark_color: slot.dark_color,
                blend: slot.blend,
            })
            .collect::<Vec<_>>();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| IkConstraint {
                data_index,
                mix: c.mix,
                softness: c.softness,
                compress: c.compress,
                stretch: c.stretch,
                bend_direction: c.bend_direction,
                active: !c.skin_required,
            })
            .collect::<Vec<_>>();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| TransformConstraint {
                data_index,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                mix_scale_x: c.mix_scale_x,
                mix_scale_y: c.mix_scale_y,
                mix_shear_y: c.mix_shear_y,
                active: !c.skin_required,
            })
            .collect::<Vec<_>>();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| PathConstraint {
                data_index,
                position: c.position,
                spacing: c.spacing,
                mix_rotate: c.mix_rotate,
                mix_x: c.mix_x,
                mix_y: c.mix_y,
                active: !c.skin_required,
            })
            .collect::<Vec<_>>();

        let draw_order = (0..slots.len()).collect::<Vec<_>>();
        let mut skeleton = Self {
            data,
            bones,
            slots,
            draw_order,
            // Skeletons start with no skin; the default skin is only an attachment fallback.
            skin: None,
            color: [1.0, 1.0, 1.0, 1.0],
            ik_constraints,
            transform_constraints,
            path_constraints,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        };
        skeleton.set_slots_to_setup_pose();
        skeleton
    }

    pub fn skin(&self) -> Option<&str> {
        self.skin.as_deref()
    }

    /// Switches the active skin. Attachments that came from the old skin are replaced by
    /// the new skin's attachment under the same key when it has one. With no previous skin,
    /// setup attachments found in the new skin are attached.
    pub fn set_skin(&mut self, skin_name: Option<&str>) -> Result<(), Error> {
        if skin_name == Some("") {
            return Err(Error::invalid("skin name must not be empty"));
        }
        if skin_name == self.skin.as_deref() {
            return Ok(());
        }
        let data = Arc::clone(&self.data);
        let new_skin = match skin_name {
            None => None,
            Some(name) => match data.skin(name) {
                Some(skin) => Some(skin),
                None => {
                    log::warn!("unknown skin '{name}'");
                    return Err(Error::UnknownSkin {
                        name: name.to_string(),
                    });
                }
            },
        };

        if let Some(new_skin) = new_skin {
            match self.skin.as_deref() {
                None => {
                    for (slot_index, slot) in self.slots.iter_mut().enumerate() {
                        let Some(setup_name) = data
                            .slots
                            .get(slot_index)
                            .and_then(|s| s.attachment.as_deref())
                        else {
                            continue;
                        };
                        if new_skin.attachment(slot_index, setup_name).is_some() {
                            slot.attachment = Some(setup_name.to_string());
                            slot.attachment_skin = Some(new_skin.name.clone());
                            slot.deform.clear();
                        }
                    }
                }
                Some(old_skin_name) => {
                    for (slot_index, slot) in self.slots.iter_mut().enumerate() {
                        let Some(current_key) = slot.attachment.as_deref() else {
                            continue;
                        };
                        if slot.attachment_skin.as_deref() != Some(old_skin_name) {
                            continue;
                        }
                        if new_skin.attachment(slot_index, current_key).is_some() {
                            slot.attachment_skin = Some(new_skin.name.clone());
                            slot.deform.clear();
                        }
                    }
                }
            }
        }

        self.skin = skin_name.map(str::to_string);
        self.update_active();
        Ok(())
    }

    /// Recomputes which skin-required bones and constraints are active for the current skin.
    fn update_active(&mut self) {
        let data = Arc::clone(&self.data);
        for (bone, bone_data) in self.bones.iter_mut().zip(&data.bones) {
            bone.active = !bone_data.skin_required;
        }
        for (c, c_data) in self.ik_constraints.iter_mut().zip(&data.ik_constraints) {
            c.active = !c_data.skin_required;
        }
        for (c, c_data) in self
            .transform_constraints
            .iter_mut()
            .zip(&data.transform_constraints)
        {
            c.active = !c_data.skin_required;
        }
        for (c, c_data) in self.path_constraints.iter_mut().zip(&data.path_constraints) {
            c.active = !c_data.skin_required;
        }

        let Some(skin) = self.skin.as_deref().and_then(|name| data.skin(name)) else {
            return;
        };
        for &bone_index in &skin.bones {
            let mut next = Some(bone_index);
            while let Some(index) = next {
                let Some(bone) = self.bones.get_mut(index) else {
                    break;
                };
                bone.active = true;
                next = bone.parent;
            }
        }
        for &i in &skin.ik_constraints {
            if let Some(c) = self.ik_constraints.get_mut(i) {
                c.active = true;
            }
        }
        for &i in &skin.transform_constraints {
            if let Some(c) = self.transform_constraints.get_mut(i) {
                c.active = true;
            }
        }
        for &i in &skin.path_constraints {
            if let Some(c) = self.path_constraints.get_mut(i) {
                c.active = true;
            }
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    pub fn set_bones_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        for (bone, setup) in self.bones.iter_mut().zip(&data.bones) {
            bone.inherit = setup.inherit;
            bone.x = setup.x;
            bone.y = setup.y;
            bone.rotation = setup.rotation;
            bone.scale_x = setup.scale_x;
            bone.scale_y = setup.scale_y;
            bone.shear_x = setup.shear_x;
            bone.shear_y = setup.shear_y;
        }

        for c in &mut self.ik_constraints {
            if let Some(setup) = data.ik_constraints.get(c.data_index) {
                c.mix = setup.mix;
                c.softness = setup.softness;
                c.compress = setup.compress;
                c.stretch = setup.stretch;
                c.bend_direction = setup.bend_direction;
            }
        }
        for c in &mut self.transform_constraints {
            if let Some(setup) = data.transform_constraints.get(c.data_index) {
                c.mix_rotate = setup.mix_rotate;
                c.mix_x = setup.mix_x;
                c.mix_y = setup.mix_y;
                c.mix_scale_x = setup.mix_scale_x;
                c.mix_scale_y = setup.mix_scale_y;
                c.mix_shear_y = setup.mix_shear_y;
            }
        }
        for c in &mut self.path_constraints {
            if let Some(setup) = data.path_constraints.get(c.data_index) {
                c.position = setup.position;
                c.spacing = setup.spacing;
                c.mix_rotate = setup.mix_rotate;
                c.mix_x = setup.mix_x;
                c.mix_y = setup.mix_y;
            }
        }
    }

    pub fn set_slots_to_setup_pose(&mut self) {
        let data = Arc::clone(&self.data);
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());

        for slot_index in 0..self.slots.len() {
            let Some(setup) = data.slots.get(slot_index) else {
                continue;
            };
            let resolved = setup.attachment.as_deref().and_then(|name| {
                self.attachment_source_skin(slot_index, name)
                    .map(|skin| (name.to_string(), skin.to_string()))
            });
            let slot = &mut self.slots[slot_index];
            slot.color = setup.color;
            slot.has_dark = setup.has_dark;
            slot.dark_color = setup.dark_color;
            slot.blend = setup.blend;
            slot.deform.clear();
            match resolved {
                Some((key, skin)) => {
                    slot.attachment = Some(key);
                    slot.attachment_skin = Some(skin);
                }
                None => {
                    slot.attachment = None;
                    slot.attachment_skin = None;
                }
            }
        }
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.find_slot(name)
    }

    /// Looks up an attachment in the active skin, then in the default skin.
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        let skin = self.attachment_source_skin(slot_index, attachment_name)?;
        self.data.skin(skin)?.attachment(slot_index, attachment_name)
    }

    fn attachment_source_skin(&self, slot_index: usize, attachment_name: &str) -> Option<&str> {
        if let Some(skin_name) = self.skin.as_deref() {
            if self
                .data
                .skin(skin_name)
                .is_some_and(|skin| skin.attachment(slot_index, attachment_name).is_some())
            {
                return Some(skin_name);
            }
        }
        let default_skin = self.data.default_skin()?;
        default_skin
            .attachment(slot_index, attachment_name)
            .map(|_| default_skin.name.as_str())
    }

    /// The attachment currently shown by the slot.
    pub fn slot_attachment_data(&self, slot_index: usize) -> Option<&AttachmentData> {
        let slot = self.slots.get(slot_index)?;
        let key = slot.attachment.as_deref()?;
        let skin = slot.attachment_skin.as_deref()?;
        self.data.skin(skin)?.attachment(slot_index, key)
    }

    /// Shows `attachment_name` in the named slot, or clears it with `None`. An unknown
    /// attachment leaves the slot empty.
    pub fn set_attachment(
        &mut self,
        slot_name: &str,
        attachment_name: Option<&str>,
    ) -> Result<(), Error> {
        let Some(slot_index) = self.data.find_slot(slot_name) else {
            log::warn!("unknown slot '{slot_name}'");
            return Err(Error::UnknownSlot {
                name: slot_name.to_string(),
            });
        };
        if let Some(name) = attachment_name {
            if self.attachment(slot_index, name).is_none() {
                log::warn!("unknown attachment '{name}' for slot '{slot_name}'");
                self.assign_attachment(slot_index, None);
                return Err(Error::UnknownAttachment {
                    slot: slot_name.to_string(),
                    attachment: name.to_string(),
                });
            }
        }
        self.assign_attachment(slot_index, attachment_name);
        Ok(())
    }

    /// Sets the slot attachment by key, resolving it through the active and default skins.
    /// The deform buffer survives only when old and new attachments share a deform target.
    pub(crate) fn assign_attachment(&mut self, slot_index: usize, name: Option<&str>) {
        let data = Arc::clone(&self.data);
        let resolved = name.and_then(|name| {
            let skin = self.attachment_source_skin(slot_index, name)?;
            data.skin(skin).map(|skin| (name, skin.name.as_str()))
        });
        let Some(slot) = self.slots.get(slot_index) else {
            return;
        };
        let unchanged = slot.attachment.as_deref() == resolved.map(|(key, _)| key)
            && slot.attachment_skin.as_deref() == resolved.map(|(_, skin)| skin);
        if unchanged {
            return;
        }

        let old_target = self.deform_target(slot_index);
        let new_target =
            resolved.and_then(|(key, skin)| deform_target_key(&data, slot_index, skin, key));
        let keep_deform = old_target.is_some() && old_target == new_target;

        let slot = &mut self.slots[slot_index];
        if !keep_deform {
            slot.deform.clear();
        }
        slot.attachment = resolved.map(|(key, _)| key.to_string());
        slot.attachment_skin = resolved.map(|(_, skin)| skin.to_string());
    }

    /// `(skin, attachment)` that deform timelines must name to affect this slot.
    pub(crate) fn deform_target(&self, slot_index: usize) -> Option<(&str, &str)> {
        let slot = self.slots.get(slot_index)?;
        let key = slot.attachment.as_deref()?;
        let skin = slot.attachment_skin.as_deref()?;
        deform_target_key(&self.data, slot_index, skin, key)
    }

    /// Derives world transforms from the local pose, parents before children.
    pub fn update_world_transform(&mut self) {
        for bone_index in 0..self.bones.len() {
            let bone = &mut self.bones[bone_index];
            bone.ax = bone.x;
            bone.ay = bone.y;
            bone.arotation = bone.rotation;
            bone.ascale_x = bone.scale_x;
            bone.ascale_y = bone.scale_y;
            bone.ashear_x = bone.shear_x;
            bone.ashear_y = bone.shear_y;
            if !bone.active {
                continue;
            }

            match bone.parent {
                Some(parent_index) => {
                    let Some(p) = self.bones.get(parent_index) else {
                        continue;
                    };
                    if !p.active {
                        continue;
                    }
                    let parent = ParentTransform {
                        a: p.a,
                        b: p.b,
                        c: p.c,
                        d: p.d,
                        world_x: p.world_x,
                        world_y: p.world_y,
                    };
                    update_world_transform_child(
                        &mut self.bones[bone_index],
                        self.scale_x,
                        self.scale_y,
                        &parent,
                    );
                }
                None => update_world_transform_root(
                    &mut self.bones[bone_index],
                    self.x,
                    self.y,
                    self.scale_x,
                    self.scale_y,
                ),
            }
        }
    }

    /// Recomputes the applied local transform of a bone from its world transform, after the
    /// host edits world values directly.
    pub fn update_applied_transform(&mut self, bone_index: usize) {
        let Some(bone) = self.bones.get(bone_index) else {
            return;
        };
        let (a, b, c0, d, wx, wy) = (bone.a, bone.b, bone.c, bone.d, bone.world_x, bone.world_y);

        let Some(parent_index) = bone.parent else {
            let bone = &mut self.bones[bone_index];
            bone.ax = wx - self.x;
            bone.ay = wy - self.y;
            bone.arotation = c0.atan2(a).to_degrees();
            bone.ascale_x = (a * a + c0 * c0).sqrt();
            bone.ascale_y = (b * b + d * d).sqrt();
            bone.ashear_x = 0.0;
            bone.ashear_y = (a * b + c0 * d).atan2(a * d - b * c0).to_degrees();
            return;
        };

        let inherit = bone.inherit;
        let applied_rotation_deg = bone.arotation;
        let Some(p) = self.bones.get(parent_index) else {
            return;
        };
        let (pa, mut pb, pc, mut pd, pwx, pwy) = (p.a, p.b, p.c, p.d, p.world_x, p.world_y);
        let det = pa * pd - pb * pc;
        if det.abs() <= 1.0e-12 {
            return;
        }
        let mut pid = 1.0 / det;
        let mut ia = pd * pid;
        let mut ib = pb * pid;
        let mut ic = pc * pid;
        let mut id = pa * pid;

        let dx = wx - pwx;
        let dy = wy - pwy;
        let ax = dx * ia - dy * ib;
        let ay = dy * id - dx * ic;

        let (ra, rb, rc, rd) = if inherit == Inherit::OnlyTranslation {
            (a, b, c0, d)
        } else {
            match inherit {
                Inherit::NoRotationOrReflection => {
                    let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc);
                    pb = -pc * self.scale_x * s / self.scale_y;
                    pd = pa * self.scale_y * s / self.scale_x;
                    pid = 1.0 / (pa * pd - pb * pc);
                    ia = pd * pid;
                    ib = pb * pid;
                }
                Inherit::NoScale | Inherit::NoScaleOrReflection => {
                    let (sin, cos) = applied_rotation_deg.to_radians().sin_cos();
                    let mut pa = (pa * cos + pb * sin) / self.scale_x;
                    let mut pc = (pc * cos + pd * sin) / self.scale_y;
                    let mut s = (pa * pa + pc * pc).sqrt();
                    if s > 1.0e-5 {
                        s = 1.0 / s;
                    }
                    pa *= s;
                    pc *= s;
                    s = (pa * pa + pc * pc).sqrt();
                    if inherit == Inherit::NoScale {
                        let flip = (det < 0.0) != ((self.scale_x < 0.0) != (self.scale_y < 0.0));
                        if flip {
                            s = -s;
                        }
                    }
                    let r = std::f32::consts::FRAC_PI_2 + pc.atan2(pa);
                    pb = r.cos() * s;
                    pd = r.sin() * s;
                    pid = 1.0 / (pa * pd - pb * pc);
                    ia = pd * pid;
                    ib = pb * pid;
                    ic = pc * pid;
                    id = pa * pid;
                }
                Inherit::Normal | Inherit::OnlyTranslation => {}
            }

            (
                ia * a - ib * c0,
                ia * b - ib * d,
                id * c0 - ic * a,
                id * d - ic * b,
            )
        };

        let mut ascale_x = (ra * ra + rc * rc).sqrt();
        let (arotation, ascale_y, ashear_y) = if ascale_x > 1.0e-4 {
            let det2 = ra * rd - rb * rc;
            let ascale_y = det2 / ascale_x;
            let ashear_y = -(ra * rb + rc * rd).atan2(det2).to_degrees();
            let arotation = rc.atan2(ra).to_degrees();
            (arotation, ascale_y, ashear_y)
        } else {
            ascale_x = 0.0;
            let ascale_y = (rb * rb + rd * rd).sqrt();
            let arotation = 90.0 - rd.atan2(rb).to_degrees();
            (arotation, ascale_y, 0.0)
        };

        let bone = &mut self.bones[bone_index];
        bone.ax = ax;
        bone.ay = ay;
        bone.arotation = arotation;
        bone.ascale_x = ascale_x;
        bone.ascale_y = ascale_y;
        bone.ashear_x = 0.0;
        bone.ashear_y = ashear_y;
    }

    /// World positions `[x0, y0, x1, y1, ..]` of the slot's vertex attachment, including
    /// its deform. `None` when the slot does not show a vertex attachment.
    pub fn vertex_attachment_world_vertices(&self, slot_index: usize) -> Option<Vec<f32>> {
        let vertices = self.slot_attachment_data(slot_index)?.vertices()?;
        let mut out = Vec::with_capacity(vertices.len() * 2);
        compute_attachment_world_vertices(self, slot_index, vertices, &mut out);
        Some(out)
    }
}

fn deform_target_key<'a>(
    data: &'a SkeletonData,
    slot_index: usize,
    skin: &'a str,
    key: &'a str,
) -> Option<(&'a str, &'a str)> {
    match data.skin(skin)?.attachment(slot_index, key)? {
        AttachmentData::Mesh(mesh) => match mesh.linked.as_ref() {
            Some(linked) if linked.inherit_timelines => Some((
                linked.skin.as_deref().unwrap_or(skin),
                linked.parent.as_str(),
            )),
            _ => Some((skin, key)),
        },
        AttachmentData::Path(_) | AttachmentData::BoundingBox(_) | AttachmentData::Clipping(_) => {
            Some((skin, key))
        }
        AttachmentData::Region(_) | AttachmentData::Point(_) | AttachmentData::Skeleton(_) => None,
    }
}

#[derive(Copy, Clone, Debug)]
struct ParentTransform {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    world_x: f32,
    world_y: f32,
}

fn update_world_transform_root(bone: &mut Bone, x: f32, y: f32, scale_x: f32, scale_y: f32) {
    let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
    let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
    let la = rotation_x.cos() * bone.ascale_x;
    let lb = rotation_y.cos() * bone.ascale_y;
    let lc = rotation_x.sin() * bone.ascale_x;
    let ld = rotation_y.sin() * bone.ascale_y;

    bone.a = la * scale_x;
    bone.b = lb * scale_x;
    bone.c = lc * scale_y;
    bone.d = ld * scale_y;
    bone.world_x = bone.ax * scale_x + x;
    bone.world_y = bone.ay * scale_y + y;
}

fn update_world_transform_child(
    bone: &mut Bone,
    skeleton_scale_x: f32,
    skeleton_scale_y: f32,
    parent: &ParentTransform,
) {
    let mut pa = parent.a;
    let mut pb = parent.b;
    let mut pc = parent.c;
    let mut pd = parent.d;

    bone.world_x = pa * bone.ax + pb * bone.ay + parent.world_x;
    bone.world_y = pc * bone.ax + pd * bone.ay + parent.world_y;

    match bone.inherit {
        Inherit::Normal => {
            let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
            let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
            let la = rotation_x.cos() * bone.ascale_x;
            let lb = rotation_y.cos() * bone.ascale_y;
            let lc = rotation_x.sin() * bone.ascale_x;
            let ld = rotation_y.sin() * bone.ascale_y;

            bone.a = pa * la + pb * lc;
            bone.b = pa * lb + pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
        }
        Inherit::OnlyTranslation => {
            let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
            let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
            bone.a = rotation_x.cos() * bone.ascale_x * skeleton_scale_x;
            bone.b = rotation_y.cos() * bone.ascale_y * skeleton_scale_x;
            bone.c = rotation_x.sin() * bone.ascale_x * skeleton_scale_y;
            bone.d = rotation_y.sin() * bone.ascale_y * skeleton_scale_y;
        }
        Inherit::NoRotationOrReflection => {
            let sx = if skeleton_scale_x.abs() > 1.0e-12 {
                1.0 / skeleton_scale_x
            } else {
                0.0
            };
            let sy = if skeleton_scale_y.abs() > 1.0e-12 {
                1.0 / skeleton_scale_y
            } else {
                0.0
            };
            pa *= sx;
            pc *= sy;

            let mut s = pa * pa + pc * pc;
            let prx;
            if s > 1.0e-4 {
                s = (pa * pd * sy - pb * sx * pc).abs() / s;
                pb = pc * s;
                pd = pa * s;
                prx = pc.atan2(pa).to_degrees();
            } else {
                pa = 0.0;
                pc = 0.0;
                prx = 90.0 - pd.atan2(pb).to_degrees();
            }

            let rotation_x = (bone.arotation + bone.ashear_x - prx).to_radians();
            let rotation_y = (bone.arotation + bone.ashear_y - prx + 90.0).to_radians();
            let la = rotation_x.cos() * bone.ascale_x;
            let lb = rotation_y.cos() * bone.ascale_y;
            let lc = rotation_x.sin() * bone.ascale_x;
            let ld = rotation_y.sin() * bone.ascale_y;

            bone.a = (pa * la - pb * lc) * skeleton_scale_x;
            bone.b = (pa * lb - pb * ld) * skeleton_scale_x;
            bone.c = (pc * la + pd * lc) * skeleton_scale_y;
            bone.d = (pc * lb + pd * ld) * skeleton_scale_y;
        }
        Inherit::NoScale | Inherit::NoScaleOrReflection => {
            let (sin, cos) = bone.arotation.to_radians().sin_cos();

            let za = (pa * cos + pb * sin) / skeleton_scale_x;
            let zc = (pc * cos + pd * sin) / skeleton_scale_y;
            let mut s = (za * za + zc * zc).sqrt();
            if s > 1.0e-5 {
                s = 1.0 / s;
            }
            let za = za * s;
            let zc = zc * s;

            let mut s2 = (za * za + zc * zc).sqrt();
            if bone.inherit == Inherit::NoScale {
                let det = pa * pd - pb * pc;
                let flip = (det < 0.0) != ((skeleton_scale_x < 0.0) != (skeleton_scale_y < 0.0));
                if flip {
                    s2 = -s2;
                }
            }

            let rotation = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
            let zb = rotation.cos() * s2;
            let zd = rotation.sin() * s2;

            let shear_x = bone.ashear_x.to_radians();
            let shear_y = (90.0 + bone.ashear_y).to_radians();
            let la = shear_x.cos() * bone.ascale_x;
            let lb = shear_y.cos() * bone.ascale_y;
            let lc = shear_x.sin() * bone.ascale_x;
            let ld = shear_y.sin() * bone.ascale_y;

            bone.a = (za * la + zb * lc) * skeleton_scale_x;
            bone.b = (za * lb + zb * ld) * skeleton_scale_x;
            bone.c = (zc * la + zd * lc) * skeleton_scale_y;
            bone.d = (zc * lb + zd * ld) * skeleton_scale_y;
        }
    }
}

/// Unweighted vertices use the deform buffer as absolute positions; weighted vertices add
/// it as per-influence offsets.
pub(crate) fn compute_attachment_world_vertices(
    skeleton: &Skeleton,
    slot_index: usize,
    vertices: &MeshVertices,
    out: &mut Vec<f32>,
) {
    out.clear();
    let Some(slot) = skeleton.slots.get(slot_index) else {
        return;
    };
    let Some(bone) = skeleton.bones.get(slot.bone) else {
        return;
    };
    let deform = slot.deform.as_slice();

    match vertices {
        MeshVertices::Unweighted(v) => {
            let use_deform = deform.len() >= v.len() * 2 && !deform.is_empty();
            for (i, p) in v.iter().enumerate() {
                let (vx, vy) = if use_deform {
                    (deform[i * 2], deform[i * 2 + 1])
                } else {
                    (p[0], p[1])
                };
                out.extend(bone.local_to_world(vx, vy));
            }
        }
        MeshVertices::Weighted(v) => {
            let mut f = 0usize;
            for weights in v {
                let mut wx = 0.0f32;
                let mut wy = 0.0f32;
                for w in weights {
                    let dx = deform.get(f).copied().unwrap_or(0.0);
                    let dy = deform.get(f + 1).copied().unwrap_or(0.0);
                    f += 2;
                    let Some(b) = skeleton.bones.get(w.bone) else {
                        continue;
                    };
                    let [x, y] = b.local_to_world(w.x + dx, w.y + dy);
                    wx += x * w.weight;
                    wy += y * w.weight;
                }
                out.push(wx);
                out.push(wy);
            }
        }
    }
}
