//! Parallel Riccati variant (spec.md §4.2, "C4"): splits the horizon into
//! `num_threads` contiguous chunks, condenses each chunk independently into
//! a small boundary-coupled knot, reconciles the chunk boundaries by running
//! the ordinary serial kernel on the tiny reduced problem, then re-expands
//! each chunk's interior factors in parallel using the now-known exact
//! boundary value function.
//!
//! Only legal when every stage uses a linear rollout (enforced by the
//! caller at `setup`, spec.md §4.7) and currently supports `problem.nth == 0`
//! (see DESIGN.md).

use nalgebra::DMatrix;

use crate::error::GarError;
use crate::gar::knot::{Dynamics, InitialConstraint, Knot, LQProblem, ParamBlock};
use crate::gar::riccati::{backward, backward_terminal, stage_kernel_solve};
use crate::gar::stage_factor::StageFactor;
use crate::scalar::Scalar;

/// Contiguous `[lo, hi)` index ranges covering `0..=n`, `num_chunks` of them
/// (the last range includes the terminal knot `n`).
fn chunk_ranges(n_plus_one: usize, num_chunks: usize) -> Vec<(usize, usize)> {
    let num_chunks = num_chunks.max(1).min(n_plus_one);
    let base = n_plus_one / num_chunks;
    let rem = n_plus_one % num_chunks;
    let mut ranges = Vec::with_capacity(num_chunks);
    let mut lo = 0;
    for c in 0..num_chunks {
        let size = base + if c < rem { 1 } else { 0 };
        ranges.push((lo, lo + size));
        lo += size;
    }
    ranges
}

/// A knot whose sole purpose is to pin the chunk's exit state as a
/// parametric variable `theta = x_hi`, with zero cost and zero further
/// dynamics. Appending it as the terminal knot of a chunk's sub-problem
/// makes `backward()` produce, at the chunk's first knot, a value function
/// quadratic in both the chunk's entry state (`Pmat`/`pvec`) and `x_hi`
/// (`Vxt`/`Vtt`/`vt`) -- the exact two-point condensation of the chunk.
fn pinning_terminal(nx_hi: usize) -> Knot {
    Knot {
        nx: nx_hi,
        nu: 0,
        nc: 0,
        nth: nx_hi,
        q: DMatrix::zeros(nx_hi, nx_hi),
        s: DMatrix::zeros(nx_hi, 0),
        r: DMatrix::zeros(0, 0),
        qv: nalgebra::DVector::zeros(nx_hi),
        rv: nalgebra::DVector::zeros(0),
        dynamics: None,
        c: DMatrix::zeros(0, nx_hi),
        d: DMatrix::zeros(0, 0),
        dv: nalgebra::DVector::zeros(0),
        params: Some(ParamBlock {
            gx: DMatrix::identity(nx_hi, nx_hi),
            gu: DMatrix::zeros(0, nx_hi),
            gth: DMatrix::zeros(nx_hi, nx_hi),
            gamma: nalgebra::DVector::zeros(nx_hi),
        }),
    }
}

/// Builds the chunk's own sub-problem: for the last chunk, `stages[lo..hi]`
/// already ends in the problem's real terminal knot; for every other chunk
/// it is the chunk's interior knots plus a [`pinning_terminal`] standing in
/// for the next chunk's entry state.
fn chunk_subproblem(problem: &LQProblem, lo: usize, hi: usize) -> LQProblem {
    let n = problem.horizon();
    let is_last = hi == n + 1;
    let mut stages: Vec<Knot> = problem.stages[lo..hi].to_vec();
    let nth = if is_last {
        stages.last().map(|k| k.nth).unwrap_or(0)
    } else {
        let nx_hi = problem.stages[hi].nx;
        stages.push(pinning_terminal(nx_hi));
        nx_hi
    };
    LQProblem {
        stages,
        init: InitialConstraint {
            g0: DMatrix::zeros(0, 0),
            g0v: nalgebra::DVector::zeros(0),
        },
        nth,
    }
}

/// Builds the reduced problem over chunk boundaries: chunk `c`'s condensed
/// cost becomes knot `c`'s own `(Q,S,R,qv,rv)`, and its "control" is the
/// next chunk's entry state, passed through via identity dynamics.
fn reduced_problem(problem: &LQProblem, chunk_vms: &[ChunkVm]) -> LQProblem {
    let num_chunks = chunk_vms.len();
    let mut stages = Vec::with_capacity(num_chunks);
    for (c, vm) in chunk_vms.iter().enumerate() {
        let is_last = c == num_chunks - 1;
        let nu = if is_last { 0 } else { vm.vtt.nrows() };
        let dynamics = if is_last {
            None
        } else {
            let nx_next = nu;
            Some(Dynamics {
                a: DMatrix::zeros(nx_next, vm.pmat.nrows()),
                b: DMatrix::identity(nx_next, nx_next),
                e: DMatrix::identity(nx_next, nx_next),
                f: nalgebra::DVector::zeros(nx_next),
            })
        };
        let nx = vm.pmat.nrows();
        stages.push(Knot {
            nx,
            nu,
            nc: 0,
            nth: 0,
            q: vm.pmat.clone(),
            s: vm.vxt.clone(),
            r: vm.vtt.clone(),
            qv: vm.pvec.clone(),
            rv: vm.vt.clone(),
            dynamics,
            c: DMatrix::zeros(0, nx),
            d: DMatrix::zeros(0, nu),
            dv: nalgebra::DVector::zeros(0),
            params: None,
        });
    }
    LQProblem {
        stages,
        init: problem.init.clone(),
        nth: 0,
    }
}

#[derive(Clone)]
struct ChunkVm {
    pmat: DMatrix<Scalar>,
    pvec: nalgebra::DVector<Scalar>,
    vxt: DMatrix<Scalar>,
    vtt: DMatrix<Scalar>,
    vt: nalgebra::DVector<Scalar>,
}

fn condense_chunk(problem: &LQProblem, lo: usize, hi: usize, mudyn: Scalar, mueq: Scalar) -> Result<ChunkVm, GarError> {
    let sub = chunk_subproblem(problem, lo, hi);
    let mut sub_datas = crate::gar::riccati::allocate_stage_factors(&sub);
    backward(&sub, &mut sub_datas, mudyn, mueq)?;
    let vm = &sub_datas[0].vm;
    Ok(ChunkVm {
        pmat: vm.pmat.clone(),
        pvec: vm.pvec.clone(),
        vxt: vm.vxt.clone(),
        vtt: vm.vtt.clone(),
        vt: vm.vt.clone(),
    })
}

/// Re-expands chunk `c`'s interior [`StageFactor`]s given the true boundary
/// value function `vn` at its exit. `datas` is this chunk's own local slice
/// (`datas[i]` corresponds to the global knot index `lo + i`).
fn expand_chunk(
    problem: &LQProblem,
    datas: &mut [StageFactor],
    lo: usize,
    hi: usize,
    is_last: bool,
    boundary_vm: crate::gar::stage_factor::ValueFunction,
    mudyn: Scalar,
    mueq: Scalar,
) -> Result<(), GarError> {
    let n = problem.horizon();
    let mut vn = boundary_vm;
    // `hi` is exclusive: for the last chunk it equals `n + 1`, so the
    // terminal knot `n` is the chunk's own last entry and is handled here
    // rather than by the generic interior loop below; every other chunk's
    // `hi` is another chunk's entry, already condensed into `vn`.
    let interior_hi = if is_last {
        let local_n = n - lo;
        backward_terminal(&problem.stages[n], &mut datas[local_n], mueq)?;
        vn = datas[local_n].vm.clone();
        n
    } else {
        hi
    };
    if interior_hi == lo {
        return Ok(());
    }
    let mut t = interior_hi - 1;
    loop {
        let local_t = t - lo;
        stage_kernel_solve(t, &problem.stages[t], &mut datas[local_t], &mut vn, mudyn, mueq)?;
        if t == lo {
            break;
        }
        t -= 1;
    }
    Ok(())
}

/// Parallel backward sweep. Falls back to [`backward`] when the `rayon`
/// feature is disabled or the problem is too small to split.
pub fn backward_parallel(
    problem: &LQProblem,
    datas: &mut [StageFactor],
    mudyn: Scalar,
    mueq: Scalar,
    num_threads: usize,
) -> Result<(), GarError> {
    if problem.nth > 0 {
        tracing::warn!("parallel Riccati does not support nth > 0 yet, running serial");
        return backward(problem, datas, mudyn, mueq);
    }
    let n = problem.horizon();
    if num_threads <= 1 || n + 1 <= num_threads {
        return backward(problem, datas, mudyn, mueq);
    }

    let ranges = chunk_ranges(n + 1, num_threads);
    let num_chunks = ranges.len();

    #[cfg(feature = "rayon")]
    let chunk_vms: Vec<ChunkVm> = {
        use rayon::prelude::*;
        ranges
            .par_iter()
            .map(|&(lo, hi)| condense_chunk(problem, lo, hi, mudyn, mueq))
            .collect::<Result<Vec<_>, _>>()?
    };
    #[cfg(not(feature = "rayon"))]
    let chunk_vms: Vec<ChunkVm> = {
        tracing::warn!("rayon feature disabled, running parallel Riccati sequentially");
        ranges
            .iter()
            .map(|&(lo, hi)| condense_chunk(problem, lo, hi, mudyn, mueq))
            .collect::<Result<Vec<_>, _>>()?
    };

    let reduced = reduced_problem(problem, &chunk_vms);
    let mut reduced_datas = crate::gar::riccati::allocate_stage_factors(&reduced);
    backward(&reduced, &mut reduced_datas, mudyn, mueq)?;

    // `reduced_datas[c].vm` is the true value function at chunk `c`'s ENTRY
    // (global index `lo_c`); the value function a chunk needs to re-expand
    // its own interior is the one at its EXIT (`lo_{c+1}`), i.e. the next
    // reduced knot. The last chunk recomputes its own terminal and ignores
    // this value, so the final placeholder entry is never read.
    let boundary_vms: Vec<_> = (0..num_chunks)
        .map(|c| {
            if c + 1 < reduced_datas.len() {
                reduced_datas[c + 1].vm.clone()
            } else {
                reduced_datas[c].vm.clone()
            }
        })
        .collect();

    let mut remaining: &mut [StageFactor] = datas;
    let mut slices = Vec::with_capacity(num_chunks);
    for &(lo, hi) in &ranges {
        let width = hi - lo;
        let (head, tail) = remaining.split_at_mut(width);
        slices.push((lo, hi, head));
        remaining = tail;
    }

    let jobs: Vec<(usize, usize, usize, bool, crate::gar::stage_factor::ValueFunction)> = ranges
        .iter()
        .enumerate()
        .map(|(c, &(lo, hi))| {
            let is_last = c == num_chunks - 1;
            (c, lo, hi, is_last, boundary_vms[c].clone())
        })
        .collect();

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        slices
            .into_par_iter()
            .zip(jobs.into_par_iter())
            .try_for_each(|((_, hi, chunk_datas), (_, lo, hi2, is_last, vm))| {
                debug_assert_eq!(hi, hi2);
                expand_chunk(problem, chunk_datas, lo, hi, is_last, vm, mudyn, mueq)
            })?;
    }
    #[cfg(not(feature = "rayon"))]
    {
        for ((_, hi, chunk_datas), (_, lo, hi2, is_last, vm)) in slices.into_iter().zip(jobs.into_iter()) {
            debug_assert_eq!(hi, hi2);
            expand_chunk(problem, chunk_datas, lo, hi, is_last, vm, mudyn, mueq)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gar::knot::InitialConstraint;
    use nalgebra::DVector;

    fn toy_problem(n: usize) -> LQProblem {
        let nx = 2;
        let nu = 1;
        let mut stages = Vec::new();
        for _ in 0..n {
            let mut k = Knot::zeros_interior(nx, nu, 0, nx, 0);
            k.q = DMatrix::identity(nx, nx);
            k.r = DMatrix::identity(nu, nu);
            let dyn_ = k.dynamics.as_mut().unwrap();
            dyn_.a = DMatrix::identity(nx, nx);
            dyn_.b = DMatrix::from_row_slice(nx, nu, &[1.0, 0.5]);
            stages.push(k);
        }
        let mut kt = Knot::zeros_terminal(nx, 0, 0, 0);
        kt.q = DMatrix::identity(nx, nx);
        stages.push(kt);
        LQProblem {
            stages,
            init: InitialConstraint {
                g0: DMatrix::identity(nx, nx),
                g0v: DVector::from_vec(vec![1.0, -1.0]),
            },
            nth: 0,
        }
    }

    #[test]
    fn chunk_ranges_cover_everything_contiguously() {
        let ranges = chunk_ranges(10, 3);
        assert_eq!(ranges.first().unwrap().0, 0);
        assert_eq!(ranges.last().unwrap().1, 10);
        for w in ranges.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
    }

    #[test]
    fn parallel_backward_matches_serial() {
        let problem = toy_problem(6);
        let mut serial = crate::gar::riccati::allocate_stage_factors(&problem);
        backward(&problem, &mut serial, 1e-3, 1e-3).unwrap();

        let mut par = crate::gar::riccati::allocate_stage_factors(&problem);
        backward_parallel(&problem, &mut par, 1e-3, 1e-3, 3).unwrap();

        for t in 0..serial.len() {
            assert!((serial[t].vm.pmat.clone() - par[t].vm.pmat.clone()).norm() < 1e-8);
            assert!((serial[t].vm.pvec.clone() - par[t].vm.pvec.clone()).norm() < 1e-8);
            assert!((serial[t].ff.data.clone() - par[t].ff.data.clone()).norm() < 1e-8);
            assert!((serial[t].fb.data.clone() - par[t].fb.data.clone()).norm() < 1e-8);
        }
    }
}
