use proptest::prelude::*;
use tessel_geom::{Aabb, Frustum, Vec3};

fn coord() -> impl Strategy<Value = f32> {
    -200.0f32..200.0
}

fn arb_point() -> impl Strategy<Value = Vec3> {
    (coord(), coord(), coord()).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn arb_dir() -> impl Strategy<Value = Vec3> {
    (-1.0f32..1.0, -0.7f32..0.7, -1.0f32..1.0)
        .prop_filter("non-degenerate", |(x, _, z)| x.abs() + z.abs() > 0.1)
        .prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

proptest! {
    // Any box containing a point inside the frustum must pass the box test
    #[test]
    fn box_around_inside_point_is_visible(eye in arb_point(), dir in arb_dir(), t in 1.0f32..60.0, half in 0.1f32..8.0) {
        let f = Frustum::from_camera(eye, dir, Vec3::UP, 1.2, 1.5, 0.1, 100.0);
        let p = eye + dir.normalized() * t;
        prop_assume!(f.contains_point(p));
        let b = Aabb::new(p - Vec3::splat(half), p + Vec3::splat(half));
        prop_assert!(f.intersects_aabb(&b));
    }

    // Boxes entirely behind the eye are always rejected
    #[test]
    fn box_behind_eye_is_culled(eye in arb_point(), dir in arb_dir(), back in 2.0f32..50.0) {
        let f = Frustum::from_camera(eye, dir, Vec3::UP, 1.2, 1.5, 0.1, 100.0);
        let c = eye - dir.normalized() * (back + 2.0);
        let b = Aabb::new(c - Vec3::splat(0.5), c + Vec3::splat(0.5));
        prop_assert!(!f.intersects_aabb(&b));
    }
}
