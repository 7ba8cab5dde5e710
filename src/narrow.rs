//! Narrow-phase collision detection.
//!
//! One function per shape pair. Each writes its contacts into a
//! fixed-capacity [`CollisionData`] and returns how many it wrote. A
//! function writes nothing when the shapes do not touch or the buffer is
//! full; it never writes past the buffer's limit.
//!
//! Every contact follows the convention of [`Contact`]: the normal points
//! from body 1 toward body 0.

use nalgebra::Vector3;

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::BodyId;
use crate::contact::Contact;
use crate::shape::{CollisionBox, Plane, Shape, Sphere};

/// Output buffer for the narrow phase.
#[derive(Debug, Clone)]
pub struct CollisionData<const C: usize> {
    contacts: heapless::Vec<Contact, C>,
    limit: usize,

    /// Restitution written into new contacts.
    pub restitution: f32,

    /// Friction written into new contacts.
    pub friction: f32,

    /// Distance above a half-space or a box face at which box vertices
    /// still count as touching it.
    pub tolerance: f32,
}

impl<const C: usize> Default for CollisionData<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> CollisionData<C> {
    pub fn new() -> Self {
        Self {
            contacts: heapless::Vec::new(),
            limit: C,
            restitution: 0.5,
            friction: 0.3,
            tolerance: 0.0,
        }
    }

    /// Drop all contacts and accept up to `min(limit, C)` new ones.
    pub fn reset(&mut self, limit: usize) {
        self.contacts.clear();
        self.limit = limit.min(C);
    }

    /// Remaining free slots.
    #[inline]
    pub fn contacts_left(&self) -> usize {
        self.limit.saturating_sub(self.contacts.len())
    }

    #[inline]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    #[inline]
    pub fn contacts_mut(&mut self) -> &mut [Contact] {
        &mut self.contacts
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    fn add(&mut self, bodies: [Option<BodyId>; 2], point: Vector3<f32>, normal: Vector3<f32>, penetration: f32) -> usize {
        if self.contacts_left() == 0 {
            return 0;
        }
        let contact = Contact::new(bodies, point, normal, penetration, self.restitution, self.friction);
        match self.contacts.push(contact) {
            Ok(()) => 1,
            Err(_) => 0,
        }
    }
}

/// Sphere against sphere. The contact point is halfway between the two
/// surfaces along the line of centers.
pub fn sphere_and_sphere<const C: usize>(one: &Sphere, two: &Sphere, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let p1 = one.position();
    let p2 = two.position();
    let midline = p1 - p2;
    let distance = midline.norm();
    if distance <= 0.0 || distance >= one.radius + two.radius {
        return 0;
    }

    let normal = midline / distance;
    let surface_one = p1 - normal * one.radius;
    let surface_two = p2 + normal * two.radius;
    let point = (surface_one + surface_two) * 0.5;
    let penetration = one.radius + two.radius - distance;
    data.add([one.primitive.body, two.primitive.body], point, normal, penetration)
}

/// Sphere against a one-sided half-space. Only a sphere reaching below the
/// plane from its positive side touches it.
pub fn sphere_and_half_space<const C: usize>(sphere: &Sphere, plane: &Plane, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let position = sphere.position();
    let distance = plane.distance(&position) - sphere.radius;
    if distance >= 0.0 {
        return 0;
    }

    let normal = plane.normal.into_inner();
    let point = position - normal * (distance + sphere.radius);
    data.add([sphere.primitive.body, None], point, normal, -distance)
}

/// Sphere against a two-sided plane. A sphere centered behind the plane is
/// pushed out of the back face.
pub fn sphere_and_true_plane<const C: usize>(sphere: &Sphere, plane: &Plane, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let position = sphere.position();
    let center_distance = plane.distance(&position);
    if center_distance * center_distance > sphere.radius * sphere.radius {
        return 0;
    }

    let mut normal = plane.normal.into_inner();
    let mut penetration = -center_distance;
    if center_distance < 0.0 {
        normal = -normal;
        penetration = -penetration;
    }
    penetration += sphere.radius;

    let point = position - plane.normal.into_inner() * center_distance;
    data.add([sphere.primitive.body, None], point, normal, penetration)
}

/// Box against a one-sided half-space: one contact per box vertex below the
/// plane (or within the tolerance above it), up to the free capacity.
pub fn box_and_half_space<const C: usize>(bx: &CollisionBox, plane: &Plane, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let normal = plane.normal.into_inner();
    let projected_radius = transform_to_axis(bx, &normal);
    if plane.distance(&bx.position()) - projected_radius > data.tolerance {
        return 0;
    }

    let mut written = 0;
    for vertex in bx.vertices() {
        let distance = plane.distance(&vertex);
        if distance > data.tolerance {
            continue;
        }
        let penetration = -distance;
        let point = vertex + normal * (penetration * 0.5);
        let added = data.add([bx.primitive.body, None], point, normal, penetration);
        if added == 0 {
            break;
        }
        written += added;
    }
    written
}

/// Box against sphere. Body 0 is the sphere, so the normal points from the
/// box toward the sphere center. A sphere whose center lies inside the box
/// produces no contact.
pub fn box_and_sphere<const C: usize>(bx: &CollisionBox, sphere: &Sphere, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let center = sphere.position();
    let local = bx.primitive.to_local(&center);
    let h = bx.half_size;
    let r = sphere.radius;

    if local.x.abs() - r > h.x || local.y.abs() - r > h.y || local.z.abs() - r > h.z {
        return 0;
    }

    let closest_local = Vector3::new(
        local.x.clamp(-h.x, h.x),
        local.y.clamp(-h.y, h.y),
        local.z.clamp(-h.z, h.z),
    );
    let distance_squared = (closest_local - local).norm_squared();
    if distance_squared > r * r {
        return 0;
    }

    let closest = bx.primitive.to_world(&closest_local);
    let offset = center - closest;
    let distance = offset.norm();
    if distance <= f32::EPSILON {
        // Center on or inside the box: no usable normal.
        return 0;
    }
    data.add([sphere.primitive.body, bx.primitive.body], closest, offset / distance, r - distance)
}

/// Box against a loose point. The point escapes along the axis of least
/// penetration; body 0 is the box.
pub fn box_and_point<const C: usize>(bx: &CollisionBox, point: &Vector3<f32>, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let local = bx.primitive.to_local(point);
    let depth = Vector3::new(
        bx.half_size.x - local.x.abs(),
        bx.half_size.y - local.y.abs(),
        bx.half_size.z - local.z.abs(),
    );
    if depth.x < 0.0 || depth.y < 0.0 || depth.z < 0.0 {
        return 0;
    }

    let axis = depth.imin();
    let sign = if local[axis] < 0.0 { -1.0 } else { 1.0 };
    // The box moves away from the point.
    let normal = bx.axis(axis) * -sign;
    data.add([bx.primitive.body, None], *point, normal, depth[axis])
}

/// Half-length of the box's projection onto `axis`.
pub fn transform_to_axis(bx: &CollisionBox, axis: &Vector3<f32>) -> f32 {
    bx.half_size.x * axis.dot(&bx.axis(0)).abs()
        + bx.half_size.y * axis.dot(&bx.axis(1)).abs()
        + bx.half_size.z * axis.dot(&bx.axis(2)).abs()
}

/// Overlap of the two boxes' projections onto `axis`. Positive values
/// overlap. `to_center` is the vector from box one's center to box two's.
pub fn penetration_on_axis(one: &CollisionBox, two: &CollisionBox, axis: &Vector3<f32>, to_center: &Vector3<f32>) -> f32 {
    let one_project = transform_to_axis(one, axis);
    let two_project = transform_to_axis(two, axis);
    let distance = to_center.dot(axis).abs();
    one_project + two_project - distance
}

/// Whether the boxes' projections onto `axis` overlap.
pub fn overlap_on_axis(one: &CollisionBox, two: &CollisionBox, axis: &Vector3<f32>) -> bool {
    let to_center = two.position() - one.position();
    penetration_on_axis(one, two, axis, &to_center) > 0.0
}

/// Axis of least penetration found so far.
#[derive(Debug, Clone, Copy)]
struct AxisCandidate {
    index: usize,
    penetration: f32,
}

/// Test one axis. Returns `None` when the boxes separate along it, and
/// leaves `best` alone for near-zero axes from parallel edges.
fn try_axis(
    one: &CollisionBox,
    two: &CollisionBox,
    axis: Vector3<f32>,
    to_center: &Vector3<f32>,
    index: usize,
    best: &mut Option<AxisCandidate>,
) -> Option<()> {
    if axis.norm_squared() < 1e-4 {
        return Some(());
    }
    let axis = axis.normalize();
    let penetration = penetration_on_axis(one, two, &axis, to_center);
    if penetration < 0.0 {
        return None;
    }
    if best.map_or(true, |b| penetration < b.penetration) {
        *best = Some(AxisCandidate { index, penetration });
    }
    Some(())
}

/// Edge penetration must be below this fraction of the best face
/// penetration for an edge-edge contact to be chosen.
const EDGE_PREFERENCE: f32 = 0.95;

/// Box against box with the 15-axis separating axis test.
///
/// Axes 0-2 are box one's faces, 3-5 box two's faces, 6-14 the cross
/// products of their edges. Face axes win ties and near-ties; box one wins
/// ties between faces. A face contact uses the vertices of the other box
/// that reach the face, deepest first; an edge-edge contact uses the
/// midpoint of the closest points on the two edges.
pub fn box_and_box<const C: usize>(one: &CollisionBox, two: &CollisionBox, data: &mut CollisionData<C>) -> usize {
    if data.contacts_left() == 0 {
        return 0;
    }
    let to_center = two.position() - one.position();

    let mut best_face = None;
    for i in 0..3 {
        if try_axis(one, two, one.axis(i), &to_center, i, &mut best_face).is_none() {
            return 0;
        }
    }
    for i in 0..3 {
        if try_axis(one, two, two.axis(i), &to_center, i + 3, &mut best_face).is_none() {
            return 0;
        }
    }
    let mut best_edge = None;
    for i in 0..3 {
        for j in 0..3 {
            let axis = one.axis(i).cross(&two.axis(j));
            if try_axis(one, two, axis, &to_center, 6 + i * 3 + j, &mut best_edge).is_none() {
                return 0;
            }
        }
    }

    let Some(face) = best_face else {
        return 0;
    };
    let best = match best_edge {
        Some(edge) if edge.penetration < EDGE_PREFERENCE * face.penetration => edge,
        _ => face,
    };

    match best.index {
        0..=2 => point_face_box_box(one, two, &to_center, best.index, best.penetration, data),
        3..=5 => point_face_box_box(two, one, &-to_center, best.index - 3, best.penetration, data),
        _ => edge_edge_box_box(one, two, &to_center, best.index - 6, best.penetration, face.index > 2, data),
    }
}

/// Contacts of the vertices of `two` against face `axis` of `one`. Body 0
/// is `one`.
///
/// The deepest vertex comes first and carries the axis penetration. Every
/// other vertex within the tolerance of the face, and over it, adds its own
/// contact so a box resting flat on another is supported at each corner.
fn point_face_box_box<const C: usize>(
    one: &CollisionBox,
    two: &CollisionBox,
    to_center: &Vector3<f32>,
    axis: usize,
    penetration: f32,
    data: &mut CollisionData<C>,
) -> usize {
    let mut normal = one.axis(axis);
    let side = if normal.dot(to_center) > 0.0 {
        normal = -normal;
        1.0
    } else {
        -1.0
    };
    let bodies = [one.primitive.body, two.primitive.body];
    let face = one.half_size[axis];

    let locals = two.vertices().map(|v| (v, one.primitive.to_local(&v)));
    let depth = |local: &Vector3<f32>| face - side * local[axis];

    let mut deepest = 0;
    for (i, (_, local)) in locals.iter().enumerate() {
        if depth(local) > depth(&locals[deepest].1) {
            deepest = i;
        }
    }
    let mut written = data.add(bodies, locals[deepest].0, normal, penetration);

    for (i, (vertex, local)) in locals.iter().enumerate() {
        if i == deepest {
            continue;
        }
        if data.contacts_left() == 0 {
            break;
        }
        let d = depth(local);
        if d < -data.tolerance {
            continue;
        }
        let over_face = (0..3)
            .filter(|&k| k != axis)
            .all(|k| local[k].abs() <= one.half_size[k] + data.tolerance);
        if over_face {
            written += data.add(bodies, *vertex, normal, d);
        }
    }
    written
}

fn edge_edge_box_box<const C: usize>(
    one: &CollisionBox,
    two: &CollisionBox,
    to_center: &Vector3<f32>,
    edge_index: usize,
    penetration: f32,
    use_one: bool,
    data: &mut CollisionData<C>,
) -> usize {
    let one_axis_index = edge_index / 3;
    let two_axis_index = edge_index % 3;
    let one_axis = one.axis(one_axis_index);
    let two_axis = two.axis(two_axis_index);
    let mut normal = one_axis.cross(&two_axis).normalize();
    if normal.dot(to_center) > 0.0 {
        normal = -normal;
    }

    // Midpoints of the two touching edges, in local space.
    let mut on_one = one.half_size;
    let mut on_two = two.half_size;
    for i in 0..3 {
        if i == one_axis_index {
            on_one[i] = 0.0;
        } else if one.axis(i).dot(&normal) > 0.0 {
            on_one[i] = -on_one[i];
        }
        if i == two_axis_index {
            on_two[i] = 0.0;
        } else if two.axis(i).dot(&normal) < 0.0 {
            on_two[i] = -on_two[i];
        }
    }
    let on_one = one.primitive.to_world(&on_one);
    let on_two = two.primitive.to_world(&on_two);

    let point = edge_contact_point(
        &on_one,
        &one_axis,
        one.half_size[one_axis_index],
        &on_two,
        &two_axis,
        two.half_size[two_axis_index],
        use_one,
    );
    data.add([one.primitive.body, two.primitive.body], point, normal, penetration)
}

/// Midpoint of the closest points of two edges, each given by its midpoint,
/// direction and half-length. Falls back to one edge's midpoint when the
/// edges are parallel or the closest points lie outside either edge.
fn edge_contact_point(
    p_one: &Vector3<f32>,
    d_one: &Vector3<f32>,
    one_size: f32,
    p_two: &Vector3<f32>,
    d_two: &Vector3<f32>,
    two_size: f32,
    use_one: bool,
) -> Vector3<f32> {
    let fallback = if use_one { *p_one } else { *p_two };

    let sm_one = d_one.norm_squared();
    let sm_two = d_two.norm_squared();
    let dp_one_two = d_two.dot(d_one);
    let to_start = p_one - p_two;
    let dp_sta_one = d_one.dot(&to_start);
    let dp_sta_two = d_two.dot(&to_start);

    let denominator = sm_one * sm_two - dp_one_two * dp_one_two;
    if denominator.abs() < 1e-4 {
        return fallback;
    }

    let mua = (dp_one_two * dp_sta_two - sm_two * dp_sta_one) / denominator;
    let mub = (sm_one * dp_sta_two - dp_one_two * dp_sta_one) / denominator;

    if mua.abs() > one_size || mub.abs() > two_size {
        return fallback;
    }

    let c_one = p_one + d_one * mua;
    let c_two = p_two + d_two * mub;
    (c_one + c_two) * 0.5
}

/// Dispatch a shape pair to the matching test.
pub fn shape_and_shape<const C: usize>(one: &Shape, two: &Shape, data: &mut CollisionData<C>) -> usize {
    match (one, two) {
        (Shape::Sphere(a), Shape::Sphere(b)) => sphere_and_sphere(a, b, data),
        (Shape::Box(a), Shape::Sphere(b)) | (Shape::Sphere(b), Shape::Box(a)) => box_and_sphere(a, b, data),
        (Shape::Box(a), Shape::Box(b)) => box_and_box(a, b, data),
    }
}

/// Dispatch a shape against a half-space.
pub fn shape_and_half_space<const C: usize>(shape: &Shape, plane: &Plane, data: &mut CollisionData<C>) -> usize {
    match shape {
        Shape::Sphere(s) => sphere_and_half_space(s, plane, data),
        Shape::Box(b) => box_and_half_space(b, plane, data),
    }
}

impl Shape {
    /// Contacts between this shape and `other`.
    #[inline]
    pub fn collide<const C: usize>(&self, other: &Shape, data: &mut CollisionData<C>) -> usize {
        shape_and_shape(self, other, data)
    }

    /// Contacts between this shape and a half-space.
    #[inline]
    pub fn collide_plane<const C: usize>(&self, plane: &Plane, data: &mut CollisionData<C>) -> usize {
        shape_and_half_space(self, plane, data)
    }
}
