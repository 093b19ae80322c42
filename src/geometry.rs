use glam::{Quat, Vec3};

use crate::waypoints::Position;

pub const DEFAULT_CLOSEST_POINT_OFFSET: f32 = 0.1;

/// Shortest rotation taking the direction of `from` onto the direction of `to`.
///
/// Zero-length or coincident inputs give the identity.
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO || from.abs_diff_eq(to, 1e-6) {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

/// Cheap "snap near target" placement: the caller's position plus a small vertical
/// offset rotated by [`rotation_between`] the caller and target position vectors.
///
/// No reachability or collision check is made; the point may not be traversable.
pub fn closest_nav_point(caller: Position, target: Position, vertical_offset: f32) -> Vec<Position> {
    let offset = rotation_between(caller, target) * Vec3::new(0.0, 0.0, vertical_offset);
    vec![caller + offset]
}

/// Point `distance` away from `source`, starting at `caller`.
///
/// When caller and source coincide the caller's facing (+X rotated by `facing`) is used.
pub fn flee_point(caller: Position, facing: Quat, source: Position, distance: f32) -> Position {
    let away = (caller - source).normalize_or_zero();
    let direction = if away == Vec3::ZERO { (facing * Vec3::X).normalize_or_zero() } else { away };
    caller + direction * distance
}
