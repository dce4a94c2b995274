//! Grow a lattice of X-junction candidates and order it like the board.

use std::collections::{HashMap, VecDeque};

use nalgebra::Vector2;
use stk_core::Pt2;

/// Seeds tried before giving up.
const MAX_SEEDS: usize = 12;
/// Allowed distance between a predicted and an accepted corner, as a
/// fraction of the local grid step.
const STEP_TOLERANCE: f64 = 0.35;

type Cell = (i32, i32);

struct Lattice {
    cells: HashMap<Cell, usize>,
}

impl Lattice {
    fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let mut keys = self.cells.keys();
        let first = keys.next()?;
        Some(keys.fold(
            (first.0, first.0, first.1, first.1),
            |(i0, i1, j0, j1), &(i, j)| (i0.min(i), i1.max(i), j0.min(j), j1.max(j)),
        ))
    }
}

fn nearest_unused(
    candidates: &[Pt2],
    used: &[bool],
    target: &Pt2,
    radius: f64,
) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(k, _)| !used[*k])
        .map(|(k, c)| (k, (c - target).norm()))
        .filter(|(_, d)| *d <= radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}

/// Two roughly orthogonal steps from the seed to its closest neighbours.
fn initial_basis(candidates: &[Pt2], seed: usize) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let origin = candidates[seed];
    let mut neighbours: Vec<(f64, Vector2<f64>)> = candidates
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != seed)
        .map(|(_, c)| {
            let d = c - origin;
            (d.norm(), d)
        })
        .collect();
    neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));
    neighbours.truncate(8);

    let (d0, u) = *neighbours.first()?;
    if d0 <= f64::EPSILON {
        return None;
    }
    let v = neighbours.iter().skip(1).find_map(|(d, v)| {
        let cos = u.dot(v) / (d0 * d);
        (cos.abs() < 0.5 && *d < 1.6 * d0).then_some(*v)
    })?;
    Some((u, v))
}

fn grow(candidates: &[Pt2], seed: usize, limit: (i32, i32)) -> Option<Lattice> {
    let (u, v) = initial_basis(candidates, seed)?;
    let mut used = vec![false; candidates.len()];
    let mut cells = HashMap::new();
    let mut queue = VecDeque::new();

    used[seed] = true;
    cells.insert((0, 0), seed);
    queue.push_back(((0, 0), seed, u, v));

    while let Some(((i, j), idx, u, v)) = queue.pop_front() {
        let p = candidates[idx];
        let tol = STEP_TOLERANCE * u.norm().min(v.norm());
        let steps = [(1, 0, u), (-1, 0, -u), (0, 1, v), (0, -1, -v)];
        for (di, dj, step) in steps {
            let cell = (i + di, j + dj);
            if cells.contains_key(&cell) {
                continue;
            }
            let Some(k) = nearest_unused(candidates, &used, &(p + step), tol) else {
                continue;
            };
            used[k] = true;
            cells.insert(cell, k);
            if cells.len() as i32 > limit.0 * limit.1 * 2 {
                return None;
            }
            let actual = candidates[k] - p;
            let (nu, nv) = if di != 0 {
                (actual * f64::from(di), v)
            } else {
                (u, actual * f64::from(dj))
            };
            queue.push_back((cell, k, nu, nv));
        }
    }
    Some(Lattice { cells })
}

/// Order a complete `cols x rows` lattice row-major. The first corner is the
/// one nearest the image's top-left; for square boards the row direction is
/// the more horizontal lattice axis.
fn order(lattice: &Lattice, candidates: &[Pt2], cols: usize, rows: usize) -> Option<Vec<Pt2>> {
    let (i0, i1, j0, j1) = lattice.bounds()?;
    let (w, h) = ((i1 - i0 + 1) as usize, (j1 - j0 + 1) as usize);
    if lattice.cells.len() != w * h {
        return None;
    }
    let at = |i: i32, j: i32| candidates[lattice.cells[&(i, j)]];

    let i_is_col = match ((w, h) == (cols, rows), (w, h) == (rows, cols)) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => {
            let axis = at(i1, j0) - at(i0, j0);
            axis.x.abs() >= axis.y.abs()
        }
        (false, false) => return None,
    };

    // Lattice cell of board corner (c, r) for a given flip choice.
    let cell = |c: usize, r: usize, flip_c: bool, flip_r: bool| -> (i32, i32) {
        let c = (if flip_c { cols - 1 - c } else { c }) as i32;
        let r = (if flip_r { rows - 1 - r } else { r }) as i32;
        if i_is_col { (i0 + c, j0 + r) } else { (i0 + r, j0 + c) }
    };

    let (flip_c, flip_r) = [(false, false), (true, false), (false, true), (true, true)]
        .into_iter()
        .min_by(|a, b| {
            let (ia, ja) = cell(0, 0, a.0, a.1);
            let (ib, jb) = cell(0, 0, b.0, b.1);
            let (pa, pb) = (at(ia, ja), at(ib, jb));
            (pa.x + pa.y).total_cmp(&(pb.x + pb.y))
        })?;

    let mut ordered = Vec::with_capacity(cols * rows);
    for r in 0..rows {
        for c in 0..cols {
            let (i, j) = cell(c, r, flip_c, flip_r);
            ordered.push(at(i, j));
        }
    }
    Some(ordered)
}

/// Find a `cols x rows` lattice among `candidates` (strongest first).
pub fn assemble(candidates: &[Pt2], cols: usize, rows: usize) -> Option<Vec<Pt2>> {
    if candidates.len() < cols * rows {
        return None;
    }
    let limit = (cols.max(rows) as i32, cols.max(rows) as i32);
    candidates
        .iter()
        .enumerate()
        .take(MAX_SEEDS)
        .find_map(|(seed, _)| {
            let lattice = grow(candidates, seed, limit)?;
            order(&lattice, candidates, cols, rows)
        })
}
