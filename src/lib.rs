//! Embedded Bogacki-Shampine 3(2) Runge-Kutta stepper for tracking particles through fields.
//!
//! The [Bogacki-Shampine](https://en.wikipedia.org/wiki/Bogacki%E2%80%93Shampine_method) pair
//! advances a state with a third-order accurate formula and, from the same stage evaluations plus
//! one evaluation at the new point, produces a second-order solution whose difference from the
//! third-order one serves as an estimate of the local truncation error. The claimed order for step
//! size control is therefore 2 (see [`INTEGRATOR_ORDER`]), even though the advanced state itself is
//! third-order accurate.
//!
//! The stepper takes exactly one step of a prescribed length per call; choosing step lengths is
//! left to the caller. After a step, [`BogackiShampine23::dist_chord`] estimates how far the curved
//! trajectory strays from the straight chord between the step's endpoints, which a caller tracking
//! a particle geometrically can use to decide whether the step was too coarse.
//!
//! States follow the usual particle-tracking layout: components `0..3` are the position,
//! components `3..6` the momentum (or velocity), and component [`TIME_INDEX`], when present, holds
//! the elapsed time. The time slot is carried through a step unchanged rather than integrated, since
//! only time-dependent fields would need it integrated and this stepper does not support those.
//!
//! The implementation follows:
//! * Bogacki, P., Shampine, L. F. "A 3(2) pair of Runge-Kutta formulas." Applied Mathematics
//!   Letters 2.4 (1989): 321-325.
//! * Press, William H. Numerical Recipes in C, 2nd Edition. Cambridge University Press, 1992.
//!   Ch. 16.2.
//!
//! As an example, consider a projectile thrown so that it comes back down after one second:
//!
//! ```
//! use bogacki_shampine::System;
//!
//! // Define the equations of motion.
//! struct Projectile {
//!     gravity: f64,
//! }
//!
//! impl System for Projectile {
//!     type Float = f64;
//!
//!     fn system(
//!         &self,
//!         y: bogacki_shampine::ArrayView1<Self::Float>,
//!         mut dydt: bogacki_shampine::ArrayViewMut1<Self::Float>,
//!     ) {
//!         for i in 0..3 {
//!             dydt[i] = y[i + 3];
//!         }
//!         dydt[3] = 0.;
//!         dydt[4] = -self.gravity;
//!         dydt[5] = 0.;
//!     }
//! }
//!
//! let system = Projectile { gravity: 9.81 };
//!
//! // A primary stepper owns an auxiliary stepper used for chord-distance estimates. Lending the
//! // system by reference leaves its ownership with the caller.
//! let mut stepper = bogacki_shampine::BogackiShampine23::with_default_variables(&system);
//!
//! let y = ndarray::array![0., 0., 0., 1., 4.905, 0.];
//! let mut dydx = ndarray::Array1::zeros(y.raw_dim());
//! system.system(y.view(), dydx.view_mut());
//!
//! let mut y_out = ndarray::Array1::zeros(y.raw_dim());
//! let mut y_err = ndarray::Array1::zeros(y.raw_dim());
//! stepper
//!     .step(y.view(), dydx.view(), 1., y_out.view_mut(), y_err.view_mut())
//!     .unwrap();
//!
//! // A third-order method is exact on a parabola.
//! approx::assert_relative_eq!(y_out[0], 1., epsilon = 1e-12);
//! approx::assert_relative_eq!(y_out[1], 0., epsilon = 1e-12);
//!
//! // The apex sits g/8 above the chord joining launch and landing points.
//! approx::assert_relative_eq!(stepper.dist_chord().unwrap(), 9.81 / 8., epsilon = 1e-12);
//!
//! // Three evaluations per step; the chord estimate is paid for by the auxiliary stepper.
//! assert_eq!(stepper.overall_stats().num_system_evals, 3);
//! assert_eq!(stepper.aux_stats().unwrap().num_system_evals, 3);
//! ```

pub mod geometry;

pub use nd::ArrayView1;
pub use nd::ArrayViewMut1;
use ndarray as nd;
use num_traits::cast;

pub trait Float:
    num_traits::Float
    + core::iter::Sum
    + core::ops::AddAssign
    + core::ops::MulAssign
    + core::fmt::Debug
    + nd::ScalarOperand
{
}

impl Float for f32 {}
impl Float for f64 {}

/// Trait for defining the equations of motion being integrated.
pub trait System {
    /// The floating point type.
    type Float: Float;

    /// Evaluate the equations of motion at `y` and store the derivative in `dydt`.
    fn system(&self, y: ArrayView1<Self::Float>, dydt: ArrayViewMut1<Self::Float>);
}

impl<S: System + ?Sized> System for &S {
    type Float = S::Float;

    fn system(&self, y: ArrayView1<Self::Float>, dydt: ArrayViewMut1<Self::Float>) {
        (**self).system(y, dydt);
    }
}

/// Number of integrated variables when none is given: position and momentum.
pub const DEFAULT_NUM_VARIABLES: usize = 6;

/// Default slot of the state reserved for elapsed time, which is carried through unintegrated.
pub const TIME_INDEX: usize = 7;

/// Order of the embedded solution, as used for step size control.
pub const INTEGRATOR_ORDER: usize = 2;

// Bogacki-Shampine tableau.
const B21: f64 = 0.5;
const B31: f64 = 0.0;
const B32: f64 = 0.75;

const C1: f64 = 2.0 / 9.0;
const C2: f64 = 1.0 / 3.0;
const C3: f64 = 4.0 / 9.0;
const C4: f64 = 0.0;

// Third-order weights minus the second-order ones.
const DC1: f64 = C1 - 7.0 / 24.0;
const DC2: f64 = C2 - 1.0 / 4.0;
const DC3: f64 = C3 - 1.0 / 3.0;
const DC4: f64 = C4 - 1.0 / 8.0;

/// Errors reported by [`BogackiShampine23`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StepperError {
    /// A buffer passed to a step does not match the number of integrated variables.
    #[error("`{name}` has {found} components, but {expected} variables are integrated")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    /// A chord distance was requested from a subordinate stepper, which has no auxiliary.
    #[error("subordinate stepper has no auxiliary stepper to estimate chord distances with")]
    NoAuxiliaryStepper,
    /// A chord distance was requested before any step was taken.
    #[error("no step has been taken yet")]
    NoStepTaken,
    /// Chord distances are measured on the first three components, which must exist.
    #[error("chord distance needs 3 position components, but only {0} variables are integrated")]
    TooFewPositionComponents(usize),
}

/// Statistics from taking integration steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of system function evaluations.
    pub num_system_evals: usize,
    /// Number of steps taken.
    pub num_steps: usize,
}

/// The auxiliary stepper owned by a primary stepper, with the buffers its half steps write to.
struct AuxiliaryStepper<S: System> {
    stepper: BogackiShampine23<S>,
    mid: nd::Array1<S::Float>,
    mid_err: nd::Array1<S::Float>,
}

/// A single-step integrator using the embedded Bogacki-Shampine 3(2) pair.
///
/// An instance is either *primary*, owning one subordinate [`BogackiShampine23`] that it uses to
/// take the half steps needed by [`dist_chord`](Self::dist_chord), or *subordinate*, owning none.
/// Subordinates are never primary, so the chain is exactly one level deep.
///
/// Scratch buffers are allocated once, at construction, and reused by every step, so an instance
/// must not be shared between threads; construct one per thread instead.
pub struct BogackiShampine23<S: System> {
    system: S,
    num_variables: usize,
    /// Slot carried through a step unintegrated, if any.
    time_index: Option<usize>,

    // Scratch space.
    k2: nd::Array1<S::Float>,
    k3: nd::Array1<S::Float>,
    k4: nd::Array1<S::Float>,
    y_temp: nd::Array1<S::Float>,
    y_in: nd::Array1<S::Float>,

    // The last step, kept for chord-distance estimates.
    last_initial: nd::Array1<S::Float>,
    last_final: nd::Array1<S::Float>,
    last_dydx: nd::Array1<S::Float>,
    /// `None` until the first step.
    last_step_length: Option<S::Float>,

    aux: Option<Box<AuxiliaryStepper<S>>>,

    overall_stats: Stats,
}

impl<S: System + Clone> BogackiShampine23<S> {
    /// Make a primary stepper integrating `num_variables` variables.
    ///
    /// The auxiliary stepper is built immediately and shares a clone of `system`; pass the system
    /// by reference to have both steppers evaluate the same instance.
    pub fn new(system: S, num_variables: usize) -> Self {
        let aux = AuxiliaryStepper {
            stepper: Self::new_subordinate(system.clone(), num_variables),
            mid: nd::Array1::zeros(num_variables),
            mid_err: nd::Array1::zeros(num_variables),
        };
        Self::build(system, num_variables, Some(Box::new(aux)))
    }

    /// Make a primary stepper integrating [`DEFAULT_NUM_VARIABLES`] variables.
    pub fn with_default_variables(system: S) -> Self {
        Self::new(system, DEFAULT_NUM_VARIABLES)
    }
}

impl<S: System> BogackiShampine23<S> {
    /// Make a subordinate stepper, which can step but cannot estimate chord distances.
    pub fn new_subordinate(system: S, num_variables: usize) -> Self {
        Self::build(system, num_variables, None)
    }

    fn build(system: S, num_variables: usize, aux: Option<Box<AuxiliaryStepper<S>>>) -> Self {
        log::debug!(
            "constructing {} Bogacki-Shampine stepper for {} variables",
            if aux.is_some() { "primary" } else { "subordinate" },
            num_variables
        );
        let zeros = || nd::Array1::zeros(num_variables);
        Self {
            system,
            num_variables,
            time_index: Some(TIME_INDEX),
            k2: zeros(),
            k3: zeros(),
            k4: zeros(),
            y_temp: zeros(),
            y_in: zeros(),
            last_initial: zeros(),
            last_final: zeros(),
            last_dydx: zeros(),
            last_step_length: None,
            aux,
            overall_stats: Stats::default(),
        }
    }

    /// Set the slot of the state holding elapsed time, or `None` to integrate every slot.
    ///
    /// The slot is only carried through when it lies within the integrated variables. Applies to
    /// the auxiliary stepper too.
    pub fn with_time_index(mut self, time_index: Option<usize>) -> Self {
        if let Some(aux) = self.aux.as_deref_mut() {
            aux.stepper.time_index = time_index;
        }
        Self { time_index, ..self }
    }

    /// Take a step of length `step_length` from `y_in`, whose derivative is `dydx`.
    ///
    /// The advanced state is stored in `y_out` and the estimated local truncation error in
    /// `y_err`. A negative `step_length` integrates backwards. Three evaluations of the system are
    /// made: two at intermediate points and one at the new state, the latter feeding only the
    /// error estimate.
    ///
    /// # Errors
    ///
    /// [`StepperError::DimensionMismatch`] if any buffer's length differs from
    /// [`num_variables`](Self::num_variables), in which case nothing is written.
    pub fn step(
        &mut self,
        y_in: ArrayView1<S::Float>,
        dydx: ArrayView1<S::Float>,
        step_length: S::Float,
        y_out: ArrayViewMut1<S::Float>,
        y_err: ArrayViewMut1<S::Float>,
    ) -> Result<(), StepperError> {
        self.check_dimension("y_in", y_in.len())?;
        self.check_dimension("dydx", dydx.len())?;
        self.check_dimension("y_out", y_out.len())?;
        self.check_dimension("y_err", y_err.len())?;

        self.y_in.assign(&y_in);
        self.advance(dydx, step_length, y_out, y_err);
        Ok(())
    }

    /// Like [`step`](Self::step), but overwrites `y` with the advanced state.
    pub fn step_in_place(
        &mut self,
        y: ArrayViewMut1<S::Float>,
        dydx: ArrayView1<S::Float>,
        step_length: S::Float,
        y_err: ArrayViewMut1<S::Float>,
    ) -> Result<(), StepperError> {
        self.check_dimension("y", y.len())?;
        self.check_dimension("dydx", dydx.len())?;
        self.check_dimension("y_err", y_err.len())?;

        self.y_in.assign(&y);
        self.advance(dydx, step_length, y, y_err);
        Ok(())
    }

    /// Estimate the distance between the trajectory of the last step and its chord.
    ///
    /// The auxiliary stepper takes half of the last step to find the trajectory's midpoint. The
    /// result is the midpoint's distance from the line through the step's endpoints, or from the
    /// shared endpoint if the step ended where it started. Only the first three components
    /// (the position) are considered.
    ///
    /// The record of the last step is left untouched, so repeated calls agree.
    ///
    /// # Errors
    ///
    /// * [`StepperError::NoStepTaken`] before the first step.
    /// * [`StepperError::NoAuxiliaryStepper`] on a subordinate stepper.
    /// * [`StepperError::TooFewPositionComponents`] if fewer than three variables are integrated.
    pub fn dist_chord(&mut self) -> Result<S::Float, StepperError> {
        if self.num_variables < 3 {
            return Err(StepperError::TooFewPositionComponents(self.num_variables));
        }
        let step_length = self.last_step_length.ok_or(StepperError::NoStepTaken)?;
        let aux = self
            .aux
            .as_deref_mut()
            .ok_or(StepperError::NoAuxiliaryStepper)?;

        let initial_point = geometry::point3(self.last_initial.view());
        let final_point = geometry::point3(self.last_final.view());

        let half: S::Float = cast(0.5).unwrap();
        aux.stepper.step(
            self.last_initial.view(),
            self.last_dydx.view(),
            half * step_length,
            aux.mid.view_mut(),
            aux.mid_err.view_mut(),
        )?;
        let mid_point = geometry::point3(aux.mid.view());

        let chord_length = geometry::distance(&initial_point, &final_point);
        if chord_length != <S::Float as num_traits::Zero>::zero() {
            Ok(geometry::distance_to_line(
                &mid_point,
                &initial_point,
                &final_point,
            ))
        } else {
            log::debug!("chord endpoints coincide, measuring from the endpoint instead");
            Ok(geometry::distance(&mid_point, &initial_point))
        }
    }

    /// Obsolete step with error estimation.
    ///
    /// No longer used: it performs no computation and always panics, so that old callers fail
    /// loudly rather than silently computing wrong results.
    #[deprecated(note = "no longer used; use `step` instead")]
    #[expect(clippy::too_many_arguments, reason = "Mirrors the obsolete signature")]
    pub fn step_with_est(
        &mut self,
        _y_in: ArrayView1<S::Float>,
        _dydx: ArrayView1<S::Float>,
        _step_length: S::Float,
        _y_out: ArrayViewMut1<S::Float>,
        _alpha2: &mut S::Float,
        _beta2: &mut S::Float,
        _b1: ArrayView1<S::Float>,
        _b2: ArrayViewMut1<S::Float>,
    ) -> ! {
        panic!("BogackiShampine23::step_with_est(): GeomField0001: method no longer used")
    }

    /// Get the number of integrated variables.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Get the order of the embedded solution, for step size control. Always 2.
    pub fn integrator_order(&self) -> usize {
        INTEGRATOR_ORDER
    }

    /// Whether this stepper owns an auxiliary stepper and can estimate chord distances.
    pub fn is_primary(&self) -> bool {
        self.aux.is_some()
    }

    /// Get the configured time slot.
    pub fn time_index(&self) -> Option<usize> {
        self.time_index
    }

    /// Get the length of the last step, or `None` if no step was taken yet.
    pub fn last_step_length(&self) -> Option<S::Float> {
        self.last_step_length
    }

    /// Get the overall stats across all steps taken so far.
    pub fn overall_stats(&self) -> &Stats {
        &self.overall_stats
    }

    /// Get the auxiliary stepper's stats, which count the work spent on chord distances.
    pub fn aux_stats(&self) -> Option<&Stats> {
        self.aux.as_deref().map(|aux| &aux.stepper.overall_stats)
    }

    fn check_dimension(&self, name: &'static str, found: usize) -> Result<(), StepperError> {
        if found == self.num_variables {
            Ok(())
        } else {
            Err(StepperError::DimensionMismatch {
                name,
                expected: self.num_variables,
                found,
            })
        }
    }

    /// Slot to carry through unintegrated, if it lies within the state.
    fn time_slot(&self) -> Option<usize> {
        self.time_index.filter(|&i| i < self.num_variables)
    }

    /// Step from the copy of the initial state held in `self.y_in`.
    ///
    /// Working from the copy lets `y_out` be the caller's initial state buffer.
    fn advance(
        &mut self,
        dydx: ArrayView1<S::Float>,
        h: S::Float,
        mut y_out: ArrayViewMut1<S::Float>,
        mut y_err: ArrayViewMut1<S::Float>,
    ) {
        let b21: S::Float = cast(B21).unwrap();
        let b31: S::Float = cast(B31).unwrap();
        let b32: S::Float = cast(B32).unwrap();
        let c1: S::Float = cast(C1).unwrap();
        let c2: S::Float = cast(C2).unwrap();
        let c3: S::Float = cast(C3).unwrap();
        let dc1: S::Float = cast(DC1).unwrap();
        let dc2: S::Float = cast(DC2).unwrap();
        let dc3: S::Float = cast(DC3).unwrap();
        let dc4: S::Float = cast(DC4).unwrap();

        log::trace!("stepping {} variables by {:?}", self.num_variables, h);

        let time_slot = self.time_slot();
        let mut system = SystemEvaluationCounter {
            system: &self.system,
            num_system_evals: 0,
        };

        nd::Zip::from(&mut self.y_temp)
            .and(&self.y_in)
            .and(&dydx)
            .for_each(|y_temp, &y_in, &dydx| {
                *y_temp = y_in + b21 * h * dydx;
            });
        if let Some(i) = time_slot {
            self.y_temp[i] = self.y_in[i];
        }
        system.system(self.y_temp.view(), self.k2.view_mut());

        nd::Zip::from(&mut self.y_temp)
            .and(&self.y_in)
            .and(&dydx)
            .and(&self.k2)
            .for_each(|y_temp, &y_in, &dydx, &k2| {
                *y_temp = y_in + h * (b31 * dydx + b32 * k2);
            });
        if let Some(i) = time_slot {
            self.y_temp[i] = self.y_in[i];
        }
        system.system(self.y_temp.view(), self.k3.view_mut());

        nd::Zip::from(&mut y_out)
            .and(&self.y_in)
            .and(&dydx)
            .and(&self.k2)
            .and(&self.k3)
            .for_each(|y_out, &y_in, &dydx, &k2, &k3| {
                *y_out = y_in + h * (c1 * dydx + c2 * k2 + c3 * k3);
            });
        if let Some(i) = time_slot {
            y_out[i] = self.y_in[i];
        }

        // Evaluated at the new state; only the error estimate uses it.
        system.system(y_out.view(), self.k4.view_mut());

        nd::Zip::from(&mut y_err)
            .and(&dydx)
            .and(&self.k2)
            .and(&self.k3)
            .and(&self.k4)
            .for_each(|y_err, &dydx, &k2, &k3, &k4| {
                *y_err = h * (dc1 * dydx + dc2 * k2 + dc3 * k3 + dc4 * k4);
            });
        if let Some(i) = time_slot {
            y_err[i] = <S::Float as num_traits::Zero>::zero();
        }

        let num_system_evals = system.num_system_evals;

        self.last_initial.assign(&self.y_in);
        self.last_final.assign(&y_out);
        self.last_dydx.assign(&dydx);
        self.last_step_length = Some(h);

        self.overall_stats.num_system_evals += num_system_evals;
        self.overall_stats.num_steps += 1;
    }
}

struct SystemEvaluationCounter<'a, S: System> {
    system: &'a S,
    num_system_evals: usize,
}

impl<'a, S: System> SystemEvaluationCounter<'a, S> {
    fn system(&mut self, y: nd::ArrayView1<S::Float>, dydt: nd::ArrayViewMut1<S::Float>) {
        self.num_system_evals += 1;
        <S as System>::system(self.system, y, dydt);
    }
}
