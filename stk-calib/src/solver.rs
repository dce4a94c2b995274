//! Levenberg-Marquardt backend shared by the intrinsic and stereo solves.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, storage::Owned};

/// Nonlinear least-squares problem over a flat parameter vector.
pub trait NllsProblem {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Defaults to central differences.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(|p| self.residuals(p), x)
    }
}

pub fn numeric_jacobian<F>(f: F, x: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let m = f(x).len();
    let mut jac = DMatrix::<f64>::zeros(m, x.len());
    let mut probe = x.clone();
    for j in 0..x.len() {
        let h = 1e-6 * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        let plus = f(&probe);
        probe[j] = x[j] - h;
        let minus = f(&probe);
        probe[j] = x[j];
        jac.set_column(j, &((plus - minus) / (2.0 * h)));
    }
    jac
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub max_iters: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            max_iters: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub evaluations: usize,
    /// `0.5 * |r|²` at the returned parameters.
    pub final_cost: f64,
    pub converged: bool,
    pub termination: String,
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

pub fn solve<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iters.max(1));

    let wrapper = LmWrapper {
        problem,
        params: x0,
    };
    let (wrapper, report) = lm.minimize(wrapper);
    let x_opt = wrapper.params();

    (
        x_opt,
        SolveReport {
            evaluations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
            termination: format!("{:?}", report.termination),
        },
    )
}
