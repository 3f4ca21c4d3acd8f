use super::Vector;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GridLayout {
    RowFirst,
    ColumnFirst,
}

/// Hands out positions on a regular grid in the z = 0 plane. With [`GridLayout::RowFirst`],
/// `grid_width` positions fill a row before moving on to the next one.
#[derive(Clone, Debug)]
pub struct GridPositionAllocator {
    min_x: f64,
    min_y: f64,
    delta_x: f64,
    delta_y: f64,
    grid_width: u32,
    layout: GridLayout,
    current: u32,
}

impl GridPositionAllocator {
    pub fn new(
        min_x: f64,
        min_y: f64,
        delta_x: f64,
        delta_y: f64,
        grid_width: u32,
        layout: GridLayout,
    ) -> Self {
        assert!(grid_width > 0, "Grid width must be positive");
        Self {
            min_x,
            min_y,
            delta_x,
            delta_y,
            grid_width,
            layout,
            current: 0,
        }
    }

    /// A square-ish grid just wide enough to hold `count` positions.
    pub fn square(delta: f64, count: u32) -> Self {
        let width = (count as f64).sqrt().ceil().max(1.0) as u32;
        Self::new(0.0, 0.0, delta, delta, width, GridLayout::RowFirst)
    }

    /// Positions handed out so far.
    pub fn allocated(&self) -> u32 {
        self.current
    }

    pub fn next_position(&mut self) -> Vector {
        let (a, b) = (self.current % self.grid_width, self.current / self.grid_width);
        self.current += 1;

        let (column, row) = match self.layout {
            GridLayout::RowFirst => (a, b),
            GridLayout::ColumnFirst => (b, a),
        };
        Vector::new(
            self.min_x + self.delta_x * column as f64,
            self.min_y + self.delta_y * row as f64,
            0.0,
        )
    }
}

impl Iterator for GridPositionAllocator {
    type Item = Vector;

    fn next(&mut self) -> Option<Vector> {
        Some(self.next_position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_first() {
        let positions: Vec<_> = GridPositionAllocator::new(0.0, 0.0, 8.0, 8.0, 3, GridLayout::RowFirst)
            .take(5)
            .collect();
        assert_eq!(
            positions,
            vec![
                Vector::new(0.0, 0.0, 0.0),
                Vector::new(8.0, 0.0, 0.0),
                Vector::new(16.0, 0.0, 0.0),
                Vector::new(0.0, 8.0, 0.0),
                Vector::new(8.0, 8.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_column_first() {
        let mut alloc = GridPositionAllocator::new(1.0, 2.0, 1.0, 1.0, 2, GridLayout::ColumnFirst);
        assert_eq!(alloc.next_position(), Vector::new(1.0, 2.0, 0.0));
        assert_eq!(alloc.next_position(), Vector::new(1.0, 3.0, 0.0));
        assert_eq!(alloc.next_position(), Vector::new(2.0, 2.0, 0.0));
        assert_eq!(alloc.allocated(), 3);
    }

    #[test]
    fn test_square() {
        let mut alloc = GridPositionAllocator::square(8.0, 100);
        let last = alloc.by_ref().take(100).last().unwrap();
        assert_eq!(last, Vector::new(72.0, 72.0, 0.0));

        let mut single = GridPositionAllocator::square(8.0, 0);
        assert_eq!(single.next_position(), Vector::ZERO);
    }
}
