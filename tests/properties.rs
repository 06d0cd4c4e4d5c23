//! Property tests for the Bogacki-Shampine stepper.
//!
//! Reproduce a failure with `PROPTEST_SEED=<seed> cargo test --test properties`.

use bogacki_shampine::{ArrayView1, ArrayViewMut1, BogackiShampine23, System, TIME_INDEX};
use ndarray::Array1;
use proptest::prelude::*;

/// A charged particle in a uniform magnetic field, plus inert trailing slots.
#[derive(Debug)]
struct UniformMagneticField {
    field: [f64; 3],
}

impl System for UniformMagneticField {
    type Float = f64;

    fn system(&self, y: ArrayView1<Self::Float>, mut dydt: ArrayViewMut1<Self::Float>) {
        let b = self.field;
        dydt[0] = y[3];
        dydt[1] = y[4];
        dydt[2] = y[5];
        dydt[3] = y[4] * b[2] - y[5] * b[1];
        dydt[4] = y[5] * b[0] - y[3] * b[2];
        dydt[5] = y[3] * b[1] - y[4] * b[0];
        for i in 6..dydt.len() {
            dydt[i] = 0.;
        }
    }
}

fn state(len: usize) -> impl Strategy<Value = Array1<f64>> {
    proptest::collection::vec(-10.0f64..10.0, len).prop_map(Array1::from)
}

fn field() -> impl Strategy<Value = UniformMagneticField> {
    proptest::array::uniform3(-2.0f64..2.0).prop_map(|field| UniformMagneticField { field })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn zero_step_leaves_state_unchanged(
        system in field(),
        y in state(8),
        dydx in state(8),
    ) {
        let mut stepper = BogackiShampine23::new(&system, 8);
        let mut y_out = Array1::zeros(8);
        let mut y_err = Array1::from_elem(8, f64::NAN);

        stepper.step(y.view(), dydx.view(), 0., y_out.view_mut(), y_err.view_mut()).unwrap();

        prop_assert_eq!(&y_out, &y);
        prop_assert!(y_err.iter().all(|&e| e == 0.), "nonzero error estimate {:?}", y_err);
    }

    #[test]
    fn in_place_step_matches_separate_output(
        system in field(),
        y in state(8),
        h in -1.0f64..1.0,
    ) {
        let mut dydx = Array1::zeros(8);
        system.system(y.view(), dydx.view_mut());

        let mut stepper = BogackiShampine23::new(&system, 8);
        let mut y_out = Array1::zeros(8);
        let mut y_err = Array1::zeros(8);
        stepper.step(y.view(), dydx.view(), h, y_out.view_mut(), y_err.view_mut()).unwrap();

        let mut in_place_stepper = BogackiShampine23::new(&system, 8);
        let mut y_aliased = y.clone();
        let mut y_err_aliased = Array1::zeros(8);
        in_place_stepper
            .step_in_place(y_aliased.view_mut(), dydx.view(), h, y_err_aliased.view_mut())
            .unwrap();

        prop_assert_eq!(y_aliased, y_out);
        prop_assert_eq!(y_err_aliased, y_err);
    }

    #[test]
    fn time_slot_passes_through(
        system in field(),
        y in state(8),
        dydx in state(8),
        h in -5.0f64..5.0,
    ) {
        let mut stepper = BogackiShampine23::new(&system, 8);
        let mut y_out = Array1::zeros(8);
        let mut y_err = Array1::zeros(8);

        stepper.step(y.view(), dydx.view(), h, y_out.view_mut(), y_err.view_mut()).unwrap();

        prop_assert_eq!(y_out[TIME_INDEX], y[TIME_INDEX]);
        prop_assert_eq!(y_err[TIME_INDEX], 0.);
    }

    #[test]
    fn dist_chord_measures_midpoint_offset(
        system in field(),
        y in state(6),
        h in -0.5f64..0.5,
    ) {
        let mut dydx = Array1::zeros(6);
        system.system(y.view(), dydx.view_mut());

        let mut stepper = BogackiShampine23::with_default_variables(&system);
        let mut y_out = Array1::zeros(6);
        let mut y_err = Array1::zeros(6);
        stepper.step(y.view(), dydx.view(), h, y_out.view_mut(), y_err.view_mut()).unwrap();

        let dist_chord = stepper.dist_chord().unwrap();
        prop_assert!(dist_chord.is_finite() && dist_chord >= 0., "bad distance {}", dist_chord);
        prop_assert_eq!(stepper.dist_chord().unwrap(), dist_chord);

        // Recompute the midpoint with a separate stepper and measure with nalgebra.
        let mut reference_stepper = BogackiShampine23::new_subordinate(&system, 6);
        let mut y_mid = Array1::zeros(6);
        let mut y_mid_err = Array1::zeros(6);
        reference_stepper
            .step(y.view(), dydx.view(), 0.5 * h, y_mid.view_mut(), y_mid_err.view_mut())
            .unwrap();
        let to_vector = |state: &Array1<f64>| nalgebra::Vector3::new(state[0], state[1], state[2]);
        let (initial, end, mid) = (to_vector(&y), to_vector(&y_out), to_vector(&y_mid));
        let chord = end - initial;
        let offset = mid - initial;
        let expected = if chord.norm() == 0. {
            offset.norm()
        } else {
            offset.cross(&chord).norm() / chord.norm()
        };

        prop_assert!(
            (dist_chord - expected).abs() <= 1e-12 * (1. + offset.norm()),
            "dist_chord {} differs from {}",
            dist_chord,
            expected
        );
    }
}
