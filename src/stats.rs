/// Running mean, minimum and maximum of the present values pushed into it.
///
/// Absent values are skipped, so the report only ever describes real observations.
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn add(&mut self, val: Option<f64>) {
        let Some(val) = val else {
            return;
        };

        self.n_vals += 1;

        let diff = val - self.mean;
        self.mean += diff / self.n_vals as f64;

        self.min = self.min.min(val);
        self.max = self.max.max(val);
    }

    /// Summary of the accumulated values, or `None` if nothing present was added.
    pub fn report(&self) -> Option<AccumulatorReport> {
        if self.n_vals == 0 {
            return None;
        }
        Some(AccumulatorReport {
            n_vals: self.n_vals,
            mean: self.mean,
            min: self.min,
            max: self.max,
        })
    }
}
