//! End-to-end tests probing synthetic analytic fields, where every answer
//! has a closed form to compare against.

use crate::*;

fn field_volume(size: usize, f: impl Fn(f64, f64, f64) -> f64) -> Volume {
    let mut data = Vec::with_capacity(size * size * size);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                data.push(f(x as f64, y as f64, z as f64));
            }
        }
    }
    Volume::new(data, 1, [size, size, size]).unwrap()
}

/// Context with the Catmull-Rom kernel family, which reproduces quadratics
/// exactly, so values and both derivative orders of low-degree polynomial
/// fields have no approximation error.
fn cubic_ctx(vol: Volume, items: &[ScalarItem]) -> (ProbeContext, BindingId) {
    let mut binding = VolumeBinding::new(&SCALAR, vol).unwrap();
    for &item in items {
        binding.item_on(item as usize).unwrap();
    }
    let mut ctx = ProbeContext::new();
    let id = ctx.attach(binding).unwrap();
    ctx.set_kernel(KernelRole::Value00, KernelSpec::catmull_rom())
        .unwrap();
    ctx.set_kernel(KernelRole::D1Measure11, KernelSpec::bc_cubic_d(0.0, 0.5))
        .unwrap();
    ctx.set_kernel(KernelRole::D2Measure22, KernelSpec::bc_cubic_dd(0.0, 0.5))
        .unwrap();
    ctx.update().unwrap();
    (ctx, id)
}

fn get(ctx: &ProbeContext, id: BindingId, item: ScalarItem) -> Vec<f64> {
    ctx.answer(id, item as usize).unwrap().to_vec()
}

#[test]
fn constant_field_has_flat_derivatives() {
    let vol = field_volume(8, |_, _, _| 3.5);
    let (mut ctx, id) = cubic_ctx(
        vol,
        &[
            ScalarItem::Value,
            ScalarItem::GradVec,
            ScalarItem::Hessian,
            ScalarItem::Laplacian,
        ],
    );
    ctx.probe(3.4, 3.7, 2.9).unwrap();
    assert!((get(&ctx, id, ScalarItem::Value)[0] - 3.5).abs() < 1e-12);
    for g in get(&ctx, id, ScalarItem::GradVec) {
        assert!(g.abs() < 1e-12, "gradient component {g} should vanish");
    }
    for h in get(&ctx, id, ScalarItem::Hessian) {
        assert!(h.abs() < 1e-11, "hessian component {h} should vanish");
    }
    assert!(get(&ctx, id, ScalarItem::Laplacian)[0].abs() < 1e-11);
}

#[test]
fn linear_ramp_is_reconstructed_exactly() {
    let (a, b, c, d) = (2.0, -3.0, 0.5, 7.0);
    let vol = field_volume(8, |x, y, z| a * x + b * y + c * z + d);
    let (mut ctx, id) = cubic_ctx(vol, &[ScalarItem::Value, ScalarItem::GradVec]);
    ctx.probe(3.3, 3.8, 3.1).unwrap();
    let v = get(&ctx, id, ScalarItem::Value)[0];
    let want = a * 3.3 + b * 3.8 + c * 3.1 + d;
    assert!((v - want).abs() < 1e-9, "value {v} vs {want}");
    let g = get(&ctx, id, ScalarItem::GradVec);
    for (gi, want) in g.iter().zip([a, b, c]) {
        assert!((gi - want).abs() < 1e-9, "gradient {gi} vs {want}");
    }
}

#[test]
fn quadratic_field_gives_exact_hessian() {
    let vol = field_volume(9, |x, _, _| x * x);
    let (mut ctx, id) = cubic_ctx(vol, &[ScalarItem::Hessian, ScalarItem::Laplacian]);
    ctx.probe(4.25, 3.5, 3.5).unwrap();
    let h = get(&ctx, id, ScalarItem::Hessian);
    assert!((h[0] - 2.0).abs() < 1e-8, "hxx {} vs 2", h[0]);
    for (i, hi) in h.iter().enumerate().skip(1) {
        assert!(hi.abs() < 1e-8, "hess[{i}] = {hi} should vanish");
    }
    assert!((get(&ctx, id, ScalarItem::Laplacian)[0] - 2.0).abs() < 1e-8);
}

#[test]
fn sphere_curvature_matches_geometry() {
    // f = r^2 about (5,5,5): every isosurface is a sphere with principal
    // curvatures -1/r under the "normal points away from the center" sign
    // convention. Probed off the sample lattice on every axis, since the
    // second-derivative cubic takes its outer-interval branch exactly at
    // the knots.
    let c = 5.0;
    let vol = field_volume(11, |x, y, z| {
        (x - c) * (x - c) + (y - c) * (y - c) + (z - c) * (z - c)
    });
    let items = [
        ScalarItem::GradMag,
        ScalarItem::Normal,
        ScalarItem::K1,
        ScalarItem::K2,
        ScalarItem::MeanCurv,
        ScalarItem::GaussCurv,
        ScalarItem::TotalCurv,
        ScalarItem::ShapeIndex,
    ];
    let (mut ctx, id) = cubic_ctx(vol, &items);
    ctx.probe(7.5, 5.5, 5.5).unwrap();
    let r = 6.75f64.sqrt();
    assert!((get(&ctx, id, ScalarItem::GradMag)[0] - 2.0 * r).abs() < 1e-6);
    let n = get(&ctx, id, ScalarItem::Normal);
    for (ni, want) in n.iter().zip([2.5 / r, 0.5 / r, 0.5 / r]) {
        assert!((ni - want).abs() < 1e-6, "normal {ni} vs {want}");
    }
    let k1 = get(&ctx, id, ScalarItem::K1)[0];
    let k2 = get(&ctx, id, ScalarItem::K2)[0];
    assert!((k1 + 1.0 / r).abs() < 1e-6, "k1 {k1} vs {}", -1.0 / r);
    assert!((k2 + 1.0 / r).abs() < 1e-6, "k2 {k2} vs {}", -1.0 / r);
    assert!((get(&ctx, id, ScalarItem::MeanCurv)[0] + 1.0 / r).abs() < 1e-6);
    assert!((get(&ctx, id, ScalarItem::GaussCurv)[0] - 1.0 / (r * r)).abs() < 1e-6);
    let tc = get(&ctx, id, ScalarItem::TotalCurv)[0];
    assert!((tc - 2.0f64.sqrt() / r).abs() < 1e-6, "total curv {tc}");
    // Equal negative curvatures: a spherical cap, shape index +1.
    assert!((get(&ctx, id, ScalarItem::ShapeIndex)[0] - 1.0).abs() < 1e-6);
}

#[test]
fn vanishing_gradient_zeroes_normal_and_curvature() {
    let c = 5.0;
    let vol = field_volume(11, |x, y, z| {
        (x - c) * (x - c) + (y - c) * (y - c) + (z - c) * (z - c)
    });
    let (mut ctx, id) = cubic_ctx(
        vol,
        &[ScalarItem::Normal, ScalarItem::GeomTens, ScalarItem::TotalCurv],
    );
    ctx.probe(5.0, 5.0, 5.0).unwrap();
    assert_eq!(
        get(&ctx, id, ScalarItem::Normal),
        vec![0.0, 0.0, 0.0],
        "zero gradient must give the zero-vector normal"
    );
    for g in get(&ctx, id, ScalarItem::GeomTens) {
        assert_eq!(g, 0.0, "geometry tensor must be zeroed");
    }
    assert_eq!(get(&ctx, id, ScalarItem::TotalCurv)[0], 0.0);
}

#[test]
fn anisotropic_spacing_scales_world_gradient() {
    let vol = field_volume(8, |x, _, _| x).with_spacing([2.0, 1.0, 1.0]);
    let (mut ctx, id) = cubic_ctx(vol, &[ScalarItem::GradVec]);
    ctx.probe(3.5, 3.0, 3.0).unwrap();
    let g = get(&ctx, id, ScalarItem::GradVec);
    // One index step along x is two world units, so df/dx_world = 1/2.
    assert!((g[0] - 0.5).abs() < 1e-9, "world gradient {} vs 0.5", g[0]);
    assert!(g[1].abs() < 1e-9 && g[2].abs() < 1e-9);
}

#[test]
fn copied_context_probes_identically() {
    let c = 5.0;
    let vol = field_volume(11, |x, y, z| {
        (x - c) * (x - c) + 2.0 * (y - c) * (y - c) + (z - c)
    });
    let (mut ctx, id) = cubic_ctx(vol, &[ScalarItem::GradMag, ScalarItem::Hessian]);
    let mut copy = ctx.copy();
    for p in [(4.3, 5.9, 6.1), (6.0, 6.0, 6.0), (4.3, 5.9, 6.1)] {
        ctx.probe(p.0, p.1, p.2).unwrap();
        copy.probe(p.0, p.1, p.2).unwrap();
        assert_eq!(
            get(&ctx, id, ScalarItem::GradMag),
            get(&copy, id, ScalarItem::GradMag),
            "copy must answer identically at {p:?}"
        );
        assert_eq!(
            get(&ctx, id, ScalarItem::Hessian),
            get(&copy, id, ScalarItem::Hessian)
        );
    }
}

#[test]
fn median_at_sample_center_is_sample_value() {
    let vol = field_volume(6, |x, _, _| x);
    let mut binding = VolumeBinding::new(&SCALAR, vol).unwrap();
    binding.item_on(ScalarItem::Median as usize).unwrap();
    let mut ctx = ProbeContext::new();
    let id = ctx.attach(binding).unwrap();
    ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
    ctx.update().unwrap();
    ctx.probe(3.0, 3.0, 3.0).unwrap();
    // All tent weight sits on the single central sample.
    assert_eq!(get(&ctx, id, ScalarItem::Median)[0], 3.0);
}

#[test]
fn probing_without_update_is_an_error() {
    let vol = field_volume(6, |_, _, _| 0.0);
    let mut binding = VolumeBinding::new(&SCALAR, vol).unwrap();
    binding.item_on(ScalarItem::Value as usize).unwrap();
    let mut ctx = ProbeContext::new();
    ctx.attach(binding).unwrap();
    ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
    assert!(matches!(
        ctx.probe(2.0, 2.0, 2.0),
        Err(ProbeError::NotUpdated)
    ));
}

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

fn stack_ctx(
    fields: &[&dyn Fn(f64, f64, f64) -> f64],
    positions: &[f64],
    stack_kernel: KernelSpec,
) -> (ProbeContext, BindingId) {
    let size = 6;
    let samples: Vec<VolumeBinding> = fields
        .iter()
        .map(|f| VolumeBinding::new(&SCALAR, field_volume(size, f)).unwrap())
        .collect();
    // Base contents are never read; blending overwrites its cache.
    let mut base = VolumeBinding::new(&SCALAR, field_volume(size, |_, _, _| 99.0)).unwrap();
    base.item_on(ScalarItem::Value as usize).unwrap();
    let mut ctx = ProbeContext::new();
    ctx.set_stack_use(true);
    let id = ctx.attach_stack(base, samples, positions).unwrap();
    ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
    ctx.set_kernel(KernelRole::Stack, stack_kernel).unwrap();
    ctx.update().unwrap();
    (ctx, id)
}

#[test]
fn stack_blends_linearly_with_tent() {
    let (mut ctx, id) = stack_ctx(
        &[&|_, _, _| 0.0, &|_, _, _| 10.0],
        &[1.0, 2.0],
        KernelSpec::tent(),
    );
    for (s, want) in [(0.0, 0.0), (1.0, 10.0), (0.5, 5.0), (0.25, 2.5)] {
        ctx.probe_stack(2.5, 2.5, 2.5, s).unwrap();
        let v = get(&ctx, id, ScalarItem::Value)[0];
        assert!((v - want).abs() < 1e-12, "blend at s={s}: {v} vs {want}");
    }
}

#[test]
fn stack_boundary_matches_unblended_sample() {
    let (mut ctx, id) = stack_ctx(
        &[&|x, _, _| x, &|_, _, _| 0.0],
        &[1.0, 4.0],
        KernelSpec::tent(),
    );
    ctx.probe_stack(2.3, 1.0, 1.0, 0.0).unwrap();
    let v = get(&ctx, id, ScalarItem::Value)[0];
    assert!((v - 2.3).abs() < 1e-12, "s at a sample is that sample alone: {v}");
}

#[test]
fn stack_world_scale_maps_through_positions() {
    let (mut ctx, id) = stack_ctx(
        &[&|_, _, _| 0.0, &|_, _, _| 10.0],
        &[1.0, 3.0],
        KernelSpec::tent(),
    );
    // World scale 1.5 is a quarter of the way through [1, 3].
    ctx.probe_stack_space(2.5, 2.5, 2.5, 1.5, false, false).unwrap();
    let via_world = get(&ctx, id, ScalarItem::Value)[0];
    ctx.probe_stack(2.5, 2.5, 2.5, 0.25).unwrap();
    assert_eq!(via_world, get(&ctx, id, ScalarItem::Value)[0]);
}

#[test]
fn stack_probe_out_of_scale_bounds_fails() {
    let (mut ctx, _) = stack_ctx(
        &[&|_, _, _| 0.0, &|_, _, _| 1.0],
        &[1.0, 2.0],
        KernelSpec::tent(),
    );
    assert!(matches!(
        ctx.probe_stack(2.0, 2.0, 2.0, 1.5),
        Err(ProbeError::BoundsStack { .. })
    ));
    assert!(ctx.last_error().is_some());
}

#[test]
fn world_scale_bounds_report_the_position_interval() {
    let (mut ctx, _) = stack_ctx(
        &[&|_, _, _| 0.0, &|_, _, _| 1.0],
        &[1.0, 3.0],
        KernelSpec::tent(),
    );
    match ctx.probe_stack_space(2.0, 2.0, 2.0, 0.5, false, false) {
        Err(ProbeError::BoundsStack { s, min, max }) => {
            assert_eq!(s, 0.5);
            assert_eq!(min, 1.0, "lower bound is the first stack position");
            assert_eq!(max, 3.0, "upper bound is the last stack position");
        }
        other => panic!("expected a stack bounds error, got {other:?}"),
    }
}

#[test]
fn hermite_stack_widens_radius_and_eases_blend() {
    let (mut ctx, id) = stack_ctx(
        &[&|_, _, _| 0.0, &|_, _, _| 10.0],
        &[1.0, 2.0],
        KernelSpec::hermite(),
    );
    assert_eq!(ctx.radius(), 2, "tent radius 1 plus the hermite bump");
    for (s, want) in [(0.0, 0.0), (1.0, 10.0), (0.5, 5.0)] {
        ctx.probe_stack(2.5, 2.5, 2.5, s).unwrap();
        let v = get(&ctx, id, ScalarItem::Value)[0];
        // Constant endpoints have zero scale derivative, so the Hermite
        // spline reduces to smoothstep, which hits these points exactly.
        assert!((v - want).abs() < 1e-12, "hermite blend at s={s}: {v} vs {want}");
    }
}

#[test]
fn plain_probe_api_rejects_stack_coordinates_when_disabled() {
    let vol = field_volume(6, |_, _, _| 1.0);
    let mut binding = VolumeBinding::new(&SCALAR, vol).unwrap();
    binding.item_on(ScalarItem::Value as usize).unwrap();
    let mut ctx = ProbeContext::new();
    ctx.attach(binding).unwrap();
    ctx.set_kernel(KernelRole::Value00, KernelSpec::tent()).unwrap();
    ctx.update().unwrap();
    assert!(matches!(
        ctx.probe_stack(2.0, 2.0, 2.0, 0.5),
        Err(ProbeError::StackNotEnabled)
    ));
}
