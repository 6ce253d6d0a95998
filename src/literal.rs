use crate::series::TimeSeries;

/// Annual OH anomaly (percent, relative to 1998-2007) with an explicit first year.
#[derive(Debug, Clone, Copy)]
pub struct LiteralDataset {
    pub name: &'static str,
    pub start_year: i32,
    pub values: &'static [f64],
}

impl LiteralDataset {
    pub fn series(&self) -> TimeSeries {
        TimeSeries::from_start(self.start_year, self.values.iter().map(|&v| Some(v)).collect())
    }
}

/// Naus et al. (2019), 1994-2014.
pub const NAUS_2019: LiteralDataset = LiteralDataset {
    name: "Naus (2019)",
    start_year: 1994,
    values: &[
        -2.7674, -2.2955, -1.2479, -2.7231, -2.2045, 0.3966, 0.7375, 1.1533, -0.3119, 0.9276,
        1.6796, 0.6734, -0.456, -1.625, -0.8399, -0.4611, 0.1752, 2.3085, 3.764, 2.8767, 0.2397,
    ],
};

/// Patra et al. (2021), 1995-2015.
pub const PATRA_2021: LiteralDataset = LiteralDataset {
    name: "Patra (2021)",
    start_year: 1995,
    values: &[
        -1.3105, -0.6539, -0.8650, -0.7590, 0.8343, 1.4527, 1.2656, -0.6990, 0.5380, 0.5467,
        -0.0412, -1.4689, -1.6691, -0.7917, -1.7498, -0.2360, 0.4298, 2.3246, 0.0298, 0.2119,
        -0.2055,
    ],
};
