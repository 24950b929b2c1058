use crate::types::{BandMatrix, CbersError, CbersResult, StretchParameters};

/// Output range of the linear stretch; 0 stays reserved for background
pub const OUTPUT_MIN: f64 = 1.0;
pub const OUTPUT_MAX: f64 = 255.0;

/// Value given to every signal pixel when the stretch domain collapses
pub const DEGENERATE_OUTPUT: u8 = 128;

/// How stretch parameters are chosen across the scene series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StretchMode {
    /// Raw samples are used as they are
    Disabled,
    /// Percentiles recomputed for every scene and band
    Independent { low_pct: f64, high_pct: f64 },
    /// Percentiles of the first scene reused for the whole series
    Locked { low_pct: f64, high_pct: f64 },
}

impl StretchMode {
    pub fn new(enabled: bool, locked: bool, percentiles: (f64, f64)) -> CbersResult<Self> {
        if !enabled {
            return Ok(StretchMode::Disabled);
        }
        let (low_pct, high_pct) = percentiles;
        validate_percentiles(low_pct, high_pct)?;
        Ok(if locked {
            StretchMode::Locked { low_pct, high_pct }
        } else {
            StretchMode::Independent { low_pct, high_pct }
        })
    }
}

fn validate_percentiles(low_pct: f64, high_pct: f64) -> CbersResult<()> {
    if !(0.0..=100.0).contains(&low_pct) || !(0.0..=100.0).contains(&high_pct) || low_pct >= high_pct {
        return Err(CbersError::InvalidInput(format!(
            "Percentiles must satisfy 0 <= low < high <= 100, got ({}, {})",
            low_pct, high_pct
        )));
    }
    Ok(())
}

/// Percentile of the strictly positive samples, linearly interpolated
/// between the closest ranks. `None` if the band holds no signal.
pub fn positive_percentile(histogram: &[u64; 256], count: u64, pct: f64) -> Option<f64> {
    if count == 0 {
        return None;
    }

    // Sample at sorted position `k` among positive values
    let value_at = |k: u64| -> f64 {
        let mut cumsum = 0u64;
        for (value, &n) in histogram.iter().enumerate().skip(1) {
            cumsum += n;
            if k < cumsum {
                return value as f64;
            }
        }
        255.0
    };

    let rank = pct / 100.0 * (count - 1) as f64;
    let lower = rank.floor();
    let frac = rank - lower;
    let a = value_at(lower as u64);
    let b = value_at((rank.ceil() as u64).min(count - 1));
    Some(a + (b - a) * frac)
}

fn positive_histogram(matrix: &BandMatrix) -> ([u64; 256], u64) {
    let mut histogram = [0u64; 256];
    for &v in matrix.iter() {
        histogram[v as usize] += 1;
    }
    let count = histogram[1..].iter().sum();
    (histogram, count)
}

/// Stretch domain from the `low_pct`/`high_pct` percentiles of the
/// positive samples, truncated to whole sample values
pub fn compute_parameters(
    matrix: &BandMatrix,
    low_pct: f64,
    high_pct: f64,
) -> CbersResult<Option<StretchParameters>> {
    validate_percentiles(low_pct, high_pct)?;
    let (histogram, count) = positive_histogram(matrix);

    let params = positive_percentile(&histogram, count, low_pct)
        .zip(positive_percentile(&histogram, count, high_pct))
        .map(|(lower, upper)| StretchParameters {
            lower: lower.trunc(),
            upper: upper.trunc(),
        });
    Ok(params)
}

/// Map signal pixels linearly from [lower, upper] onto [1, 255].
///
/// Zero samples stay zero. With `lower == upper` every signal pixel becomes
/// [`DEGENERATE_OUTPUT`].
pub fn apply_parameters(matrix: &BandMatrix, params: &StretchParameters) -> BandMatrix {
    let span = params.upper - params.lower;

    matrix.mapv(|v| {
        if v == 0 {
            0
        } else if span <= 0.0 {
            DEGENERATE_OUTPUT
        } else {
            let clipped = (v as f64).clamp(params.lower, params.upper);
            ((clipped - params.lower) * (OUTPUT_MAX - OUTPUT_MIN) / span + OUTPUT_MIN) as u8
        }
    })
}

/// Single-frame stretch: compute the parameters of `matrix` and apply them
pub fn stretch(
    matrix: &BandMatrix,
    low_pct: f64,
    high_pct: f64,
) -> CbersResult<(BandMatrix, Option<StretchParameters>)> {
    match compute_parameters(matrix, low_pct, high_pct)? {
        Some(params) => Ok((apply_parameters(matrix, &params), Some(params))),
        // Background only: nothing to map
        None => Ok((matrix.clone(), None)),
    }
}

/// Stateful stretcher that carries locked parameters across scenes.
/// Band slots are positions in the user's band list.
pub struct Stretcher {
    mode: StretchMode,
    locked: Vec<Option<StretchParameters>>,
}

impl Stretcher {
    pub fn new(mode: StretchMode) -> Self {
        Self {
            mode,
            locked: Vec::new(),
        }
    }

    pub fn mode(&self) -> StretchMode {
        self.mode
    }

    /// Parameters held for a band slot in locked mode
    pub fn locked_parameters(&self, slot: usize) -> Option<StretchParameters> {
        self.locked.get(slot).copied().flatten()
    }

    /// Stretch one band of the current scene, returning the parameters used
    pub fn stretch_band(
        &mut self,
        slot: usize,
        matrix: BandMatrix,
    ) -> CbersResult<(BandMatrix, Option<StretchParameters>)> {
        match self.mode {
            StretchMode::Disabled => Ok((matrix, None)),
            StretchMode::Independent { low_pct, high_pct } => stretch(&matrix, low_pct, high_pct),
            StretchMode::Locked { low_pct, high_pct } => {
                if self.locked.len() <= slot {
                    self.locked.resize(slot + 1, None);
                }
                if self.locked[slot].is_none() {
                    self.locked[slot] = compute_parameters(&matrix, low_pct, high_pct)?;
                    if let Some(params) = self.locked[slot] {
                        log::info!("Locked stretch for band slot {}: {:?}", slot, params);
                    }
                }
                match self.locked[slot] {
                    Some(params) => Ok((apply_parameters(&matrix, &params), Some(params))),
                    None => Ok((matrix, None)),
                }
            }
        }
    }
}
