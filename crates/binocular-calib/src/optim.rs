//! Levenberg-Marquardt optimizer for non-linear least squares problems
//!
//! The solver minimizes the sum of squared residuals of a problem made of residual
//! blocks, each depending on a small subset of the parameters. The normal equations are
//! accumulated block by block from central-difference Jacobians and the damped system
//! `(J^T J + λ diag(J^T J)) δ = -J^T r` is solved with a dense LU factorization.

use faer::prelude::SpSolver;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during optimization.
#[derive(Debug, Error, PartialEq)]
pub enum OptimizerError {
    /// The problem has no free parameter or no residual.
    #[error("Problem has no free parameters or no residuals")]
    EmptyProblem,

    /// A residual block references a parameter outside the parameter vector.
    #[error("Parameter index {0} out of bounds for {1} parameters")]
    ParameterIndexOutOfBounds(usize, usize),

    /// The parameter vector and the fixed mask have different lengths.
    #[error("Parameter vector has {0} entries but the problem expects {1}")]
    ParameterCountMismatch(usize, usize),

    /// The cost at the initial guess is not finite.
    #[error("Initial cost is not finite")]
    NonFiniteCost,
}

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Converged: relative cost change below tolerance
    CostConverged,
    /// Converged: gradient norm below tolerance
    GradientConverged,
    /// Converged: the step is negligible compared to the parameters
    StepConverged,
    /// Maximum iterations reached
    MaxIterations,
    /// Lambda exceeded maximum, no step reduces the cost any further
    LambdaMaxExceeded,
}

/// Result of an optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerResult {
    /// Cost (sum of squared residuals) at the initial guess
    pub initial_cost: f64,
    /// Final cost (sum of squared residuals)
    pub final_cost: f64,
    /// Number of accepted iterations
    pub iterations: usize,
    /// Reason for termination
    pub termination_reason: TerminationReason,
}

/// A group of residuals depending on a subset of the parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBlock {
    /// Indices into the parameter vector read by this block.
    pub params: Vec<usize>,
    /// Number of residuals produced by this block.
    pub num_residuals: usize,
}

/// A non-linear least squares problem split in residual blocks.
pub trait LeastSquaresProblem {
    /// Total number of parameters.
    fn num_params(&self) -> usize;

    /// The residual blocks and the parameters each of them depends on.
    fn blocks(&self) -> &[ResidualBlock];

    /// Evaluate the residuals of `block` at `params` into `residuals`.
    ///
    /// `residuals` has exactly `blocks()[block].num_residuals` entries.
    fn evaluate_block(&self, block: usize, params: &[f64], residuals: &mut [f64]);

    /// Sum of squared residuals over all blocks.
    fn cost(&self, params: &[f64]) -> f64 {
        let mut residuals = Vec::new();
        self.blocks()
            .iter()
            .enumerate()
            .map(|(b, block)| {
                residuals.clear();
                residuals.resize(block.num_residuals, 0.0);
                self.evaluate_block(b, params, &mut residuals);
                residuals.iter().map(|r| r * r).sum::<f64>()
            })
            .sum()
    }
}

/// Levenberg-Marquardt optimizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergMarquardt {
    /// Initial damping parameter
    pub lambda_init: f64,
    /// Maximum damping parameter
    pub lambda_max: f64,
    /// Factor for lambda adaptation
    pub lambda_factor: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Convergence threshold for the relative cost change
    pub cost_tolerance: f64,
    /// Convergence threshold for the largest gradient component
    pub gradient_tolerance: f64,
    /// Convergence threshold for the step relative to the parameters
    pub step_tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_init: 1e-3,
            lambda_max: 1e10,
            lambda_factor: 10.0,
            max_iterations: 100,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-12,
            step_tolerance: 1e-12,
        }
    }
}

/// Relative step used for the central-difference derivatives.
const DERIVATIVE_STEP: f64 = 1e-6;

impl LevenbergMarquardt {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative cost change tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Minimize the problem in place.
    ///
    /// # Arguments
    ///
    /// * `problem` - The least squares problem.
    /// * `params` - Initial guess, overwritten with the solution.
    /// * `fixed` - Parameters marked `true` are held constant.
    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        params: &mut [f64],
        fixed: &[bool],
    ) -> Result<OptimizerResult, OptimizerError> {
        let n = problem.num_params();
        if params.len() != n {
            return Err(OptimizerError::ParameterCountMismatch(params.len(), n));
        }
        if fixed.len() != n {
            return Err(OptimizerError::ParameterCountMismatch(fixed.len(), n));
        }
        if let Some(&bad) = problem
            .blocks()
            .iter()
            .flat_map(|b| b.params.iter())
            .find(|&&p| p >= n)
        {
            return Err(OptimizerError::ParameterIndexOutOfBounds(bad, n));
        }
        let num_residuals: usize = problem.blocks().iter().map(|b| b.num_residuals).sum();
        if num_residuals == 0 || fixed.iter().all(|&f| f) {
            return Err(OptimizerError::EmptyProblem);
        }

        let initial_cost = problem.cost(params);
        if !initial_cost.is_finite() {
            return Err(OptimizerError::NonFiniteCost);
        }

        let mut cost = initial_cost;
        let mut lambda = self.lambda_init;
        let mut candidate = params.to_vec();

        let result = |final_cost, iterations, termination_reason| OptimizerResult {
            initial_cost,
            final_cost,
            iterations,
            termination_reason,
        };

        for iteration in 0..self.max_iterations {
            if cost <= f64::MIN_POSITIVE {
                return Ok(result(cost, iteration, TerminationReason::CostConverged));
            }

            let (jtj, jtr) = self.normal_equations(problem, params, fixed);

            let gradient_norm = jtr.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
            if gradient_norm < self.gradient_tolerance {
                return Ok(result(cost, iteration, TerminationReason::GradientConverged));
            }

            loop {
                let delta = solve_damped_system(&jtj, &jtr, lambda, fixed);

                if let Some(delta) = delta {
                    let step_norm = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
                    let param_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                    if step_norm < self.step_tolerance * (param_norm + self.step_tolerance) {
                        return Ok(result(cost, iteration, TerminationReason::StepConverged));
                    }

                    for ((c, p), d) in candidate.iter_mut().zip(params.iter()).zip(&delta) {
                        *c = p + d;
                    }
                    let new_cost = problem.cost(&candidate);

                    if new_cost.is_finite() && new_cost < cost {
                        let relative_change = (cost - new_cost) / cost;
                        params.copy_from_slice(&candidate);
                        cost = new_cost;
                        lambda = (lambda / self.lambda_factor).max(1e-12);

                        if relative_change < self.cost_tolerance {
                            return Ok(result(
                                cost,
                                iteration + 1,
                                TerminationReason::CostConverged,
                            ));
                        }
                        break;
                    }
                }

                // step rejected: increase damping
                lambda *= self.lambda_factor;
                if lambda > self.lambda_max {
                    return Ok(result(cost, iteration, TerminationReason::LambdaMaxExceeded));
                }
            }
        }

        Ok(result(
            cost,
            self.max_iterations,
            TerminationReason::MaxIterations,
        ))
    }

    /// Build J^T J and J^T r from central-difference block Jacobians.
    fn normal_equations<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        params: &[f64],
        fixed: &[bool],
    ) -> (Vec<f64>, Vec<f64>) {
        let n = params.len();
        let mut jtj = vec![0.0; n * n];
        let mut jtr = vec![0.0; n];
        let mut work = params.to_vec();

        for (b, block) in problem.blocks().iter().enumerate() {
            let m = block.num_residuals;
            let free = block
                .params
                .iter()
                .copied()
                .filter(|&p| !fixed[p])
                .collect::<Vec<_>>();

            let mut r0 = vec![0.0; m];
            problem.evaluate_block(b, params, &mut r0);

            // column-major block jacobian: m x free.len()
            let mut jac = vec![0.0; m * free.len()];
            let mut r_plus = vec![0.0; m];
            let mut r_minus = vec![0.0; m];
            for (k, &p) in free.iter().enumerate() {
                let x = params[p];
                let h = DERIVATIVE_STEP * x.abs().max(1.0);
                work[p] = x + h;
                problem.evaluate_block(b, &work, &mut r_plus);
                work[p] = x - h;
                problem.evaluate_block(b, &work, &mut r_minus);
                work[p] = x;
                for r in 0..m {
                    jac[k * m + r] = (r_plus[r] - r_minus[r]) / (2.0 * h);
                }
            }

            for (ki, &pi) in free.iter().enumerate() {
                let col_i = &jac[ki * m..(ki + 1) * m];
                jtr[pi] += col_i.iter().zip(&r0).map(|(j, r)| j * r).sum::<f64>();
                for (kj, &pj) in free.iter().enumerate().skip(ki) {
                    let col_j = &jac[kj * m..(kj + 1) * m];
                    let v = col_i.iter().zip(col_j).map(|(a, b)| a * b).sum::<f64>();
                    jtj[pi * n + pj] += v;
                    if pi != pj {
                        jtj[pj * n + pi] += v;
                    }
                }
            }
        }

        (jtj, jtr)
    }
}

/// Solve `(J^T J + λ diag(J^T J)) δ = -J^T r`; fixed parameters get a zero step.
fn solve_damped_system(jtj: &[f64], jtr: &[f64], lambda: f64, fixed: &[bool]) -> Option<Vec<f64>> {
    let n = jtr.len();
    let mut a = faer::Mat::<f64>::zeros(n, n);
    let mut rhs = faer::Mat::<f64>::zeros(n, 1);

    for i in 0..n {
        if fixed[i] {
            a.write(i, i, 1.0);
            continue;
        }
        for j in 0..n {
            if !fixed[j] {
                a.write(i, j, jtj[i * n + j]);
            }
        }
        let diag = jtj[i * n + i];
        a.write(i, i, diag + lambda * diag.max(1e-12));
        rhs.write(i, 0, -jtr[i]);
    }

    let sol = a.partial_piv_lu().solve(rhs);
    let delta = (0..n).map(|i| sol.read(i, 0)).collect::<Vec<_>>();
    delta.iter().all(|d| d.is_finite()).then_some(delta)
}
