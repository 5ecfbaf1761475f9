//! The run-wide value bus and the committed result matrix.

/// One value per output slot, overwritten on every iteration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBuffer {
    values: Vec<f64>,
}

impl ValueBuffer {
    /// Creates a zero-filled buffer with `len` slots.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> f64 {
        self.values[slot]
    }

    #[inline]
    pub(crate) fn set(&mut self, slot: usize, value: f64) {
        self.values[slot] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Overwrites this buffer with the contents of `other`.
    pub fn copy_from(&mut self, other: &ValueBuffer) {
        self.values.copy_from_slice(&other.values);
    }

    /// Largest per-slot absolute difference to `other`.
    ///
    /// A NaN on either side yields infinity, so it never passes a tolerance test.
    pub fn max_abs_diff(&self, other: &ValueBuffer) -> f64 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| abs_diff(*a, *b))
            .fold(0.0, f64::max)
    }

    /// Slots whose values differ from `other` by more than `tolerance`.
    pub fn differing_slots(&self, other: &ValueBuffer, tolerance: f64) -> Vec<usize> {
        self.values
            .iter()
            .zip(&other.values)
            .enumerate()
            .filter(|(_, (a, b))| abs_diff(**a, **b) > tolerance)
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// `|a - b|`, with NaN mapped to infinity.
#[inline]
pub(crate) fn abs_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    if d.is_nan() { f64::INFINITY } else { d }
}

/// Append-only matrix of committed buffers, one row per timestep.
///
/// Stored row-major in a single allocation. Rows are never modified
/// once pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMatrix {
    labels: Vec<String>,
    data: Vec<f64>,
    rows: usize,
}

impl ResultMatrix {
    /// Creates an empty matrix with one column per label.
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            data: Vec::new(),
            rows: 0,
        }
    }

    /// Creates an empty matrix with room for `rows` timesteps.
    pub fn with_capacity(labels: Vec<String>, rows: usize) -> Self {
        let data = Vec::with_capacity(labels.len() * rows);
        Self {
            labels,
            data,
            rows: 0,
        }
    }

    /// Appends a committed buffer as the next row.
    pub(crate) fn push(&mut self, row: &ValueBuffer) {
        debug_assert_eq!(row.len(), self.labels.len());
        self.data.extend_from_slice(row.as_slice());
        self.rows += 1;
    }

    /// Number of committed timesteps.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn slot_count(&self) -> usize {
        self.labels.len()
    }

    /// Column keys, `<component> # <port> [<unit>]`.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Committed values of one timestep.
    pub fn row(&self, timestep: usize) -> Option<&[f64]> {
        if timestep >= self.rows {
            return None;
        }
        let width = self.labels.len();
        Some(&self.data[timestep * width..(timestep + 1) * width])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).filter_map(move |t| self.row(t))
    }

    pub fn value(&self, timestep: usize, slot: usize) -> Option<f64> {
        self.row(timestep).and_then(|r| r.get(slot).copied())
    }

    /// Time series of one slot across all committed timesteps.
    pub fn column(&self, slot: usize) -> Option<Vec<f64>> {
        if slot >= self.labels.len() {
            return None;
        }
        Some(self.rows().map(|r| r[slot]).collect())
    }

    /// Slot index of the column with this label.
    pub fn slot_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}
