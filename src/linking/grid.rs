use std::collections::HashMap;

use crate::linking::error::LinkError;

/// Hash grid over (RT, m/z) positions.
///
/// Cells are sized to the RT and m/z tolerance windows, so any pair of
/// features that could possibly match sits in cells at Chebyshev distance at
/// most 1 and a 3x3 neighborhood scan around a feature's own cell sees every
/// admissible partner. Cells hold arena ids; absent cells contribute no
/// results.
#[derive(Debug, Clone)]
pub struct HashGrid {
    cell_rt: f64,
    cell_mz: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    len: usize,
}

impl HashGrid {
    /// Cell dimensions must be positive; the engine validates them before
    /// building a grid.
    pub fn new(cell_rt: f64, cell_mz: f64) -> Self {
        HashGrid {
            cell_rt,
            cell_mz,
            cells: HashMap::new(),
            len: 0,
        }
    }

    /// Cell coordinate of a position, or a range error when the coordinate
    /// does not fit into i64 (a sign of absurd tolerance settings, fatal
    /// for the run).
    fn cell_of(&self, rt: f64, mz: f64) -> Result<(i64, i64), LinkError> {
        let x = (rt / self.cell_rt).floor();
        let y = (mz / self.cell_mz).floor();
        // i64::MAX is not exactly representable as f64; stay strictly inside
        const LIMIT: f64 = 9.0e18;
        if !x.is_finite() || !y.is_finite() || x.abs() > LIMIT || y.abs() > LIMIT {
            return Err(LinkError::GridRange { rt, mz });
        }
        Ok((x as i64, y as i64))
    }

    pub fn insert(&mut self, rt: f64, mz: f64, id: usize) -> Result<(), LinkError> {
        let cell = self.cell_of(rt, mz)?;
        self.cells.entry(cell).or_default().push(id);
        self.len += 1;
        Ok(())
    }

    /// Collect the ids stored in the 3x3 cell block around a position.
    ///
    /// Positions that were inserted always have a valid cell, so an
    /// out-of-range query simply yields nothing.
    pub fn neighbors_into(&self, rt: f64, mz: f64, out: &mut Vec<usize>) {
        let (cx, cy) = match self.cell_of(rt, mz) {
            Ok(cell) => cell,
            Err(_) => return,
        };
        for dx in -1..=1i64 {
            for dy in -1..=1i64 {
                let key = (cx.saturating_add(dx), cy.saturating_add(dy));
                if let Some(ids) = self.cells.get(&key) {
                    out.extend_from_slice(ids);
                }
            }
        }
    }

    pub fn neighbors(&self, rt: f64, mz: f64) -> Vec<usize> {
        let mut out = Vec::new();
        self.neighbors_into(rt, mz, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_cover_exactly_the_3x3_block() {
        let mut grid = HashGrid::new(10.0, 1.0);
        // center cell is (10, 5): rt in [100, 110), mz in [5, 6)
        grid.insert(105.0, 5.5, 0).unwrap();
        // all eight surrounding cells
        grid.insert(95.0, 4.5, 1).unwrap();
        grid.insert(105.0, 4.5, 2).unwrap();
        grid.insert(115.0, 4.5, 3).unwrap();
        grid.insert(95.0, 5.5, 4).unwrap();
        grid.insert(115.0, 5.5, 5).unwrap();
        grid.insert(95.0, 6.5, 6).unwrap();
        grid.insert(105.0, 6.5, 7).unwrap();
        grid.insert(115.0, 6.5, 8).unwrap();
        // two cells away in either dimension: must not appear
        grid.insert(125.0, 5.5, 9).unwrap();
        grid.insert(105.0, 7.5, 10).unwrap();
        grid.insert(85.0, 3.5, 11).unwrap();

        let mut found = grid.neighbors(105.0, 5.5);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_empty_cells_yield_nothing() {
        let mut grid = HashGrid::new(10.0, 1.0);
        grid.insert(0.0, 0.0, 0).unwrap();
        assert!(grid.neighbors(1000.0, 500.0).is_empty());
    }

    #[test]
    fn test_negative_coordinates_floor_correctly() {
        let mut grid = HashGrid::new(10.0, 1.0);
        // -0.5 / 10 floors to cell -1, not 0
        grid.insert(-0.5, 0.5, 0).unwrap();
        grid.insert(5.0, 0.5, 1).unwrap();
        // cells -1 and 0 are adjacent, both must see each other
        let mut found = grid.neighbors(-0.5, 0.5);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn test_overflowing_cell_coordinate_is_a_range_error() {
        let mut grid = HashGrid::new(1e-20, 1.0);
        let err = grid.insert(1.0, 500.0, 0).unwrap_err();
        assert!(matches!(err, LinkError::GridRange { .. }));
    }

    #[test]
    fn test_non_finite_position_is_a_range_error() {
        let mut grid = HashGrid::new(10.0, 1.0);
        assert!(grid.insert(f64::NAN, 500.0, 0).is_err());
        assert!(grid.insert(100.0, f64::INFINITY, 0).is_err());
    }

    #[test]
    fn test_len_counts_insertions() {
        let mut grid = HashGrid::new(10.0, 1.0);
        assert!(grid.is_empty());
        grid.insert(1.0, 1.0, 0).unwrap();
        grid.insert(1.0, 1.0, 1).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.num_cells(), 1);
    }
}
