//! Test data generators for synthetic raster layers.
//!
//! These generators create predictable, verifiable sample patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a slope-like grid in degrees.
///
/// Values rise linearly from 0 at the west edge to 60 at the east edge.
pub fn create_slope_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..height {
        for col in 0..width {
            data.push(col as f32 / width.max(1) as f32 * 60.0);
        }
    }
    data
}

/// Creates a fuel-model-like categorical grid.
///
/// Cells cycle through `codes` column by column.
pub fn create_category_grid(width: usize, height: usize, codes: &[u16]) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..height {
        for col in 0..width {
            data.push(codes[col % codes.len()] as f32);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid of `value` with a sentinel at the given (col, row)
/// positions.
pub fn create_grid_with_sentinel(
    width: usize,
    height: usize,
    value: f32,
    sentinel: f32,
    positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![value; width * height];
    for &(col, row) in positions {
        if col < width && row < height {
            data[row * width + col] = sentinel;
        }
    }
    data
}
