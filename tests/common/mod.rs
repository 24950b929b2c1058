#![allow(dead_code)]

use cbersgif::io::StacQuery;
use cbersgif::types::{BandMatrix, Bounds, CbersError, CbersResult, Sensor};
use cbersgif::{CatalogTransport, RasterReader};
use ndarray::Array2;
use std::cell::{Cell, RefCell};

/// Catalog transport answering from fixed identifier lists
#[derive(Default)]
pub struct FakeCatalog {
    pub path_row_ids: Vec<String>,
    pub stac_ids: Vec<String>,
    /// When set, every query fails with this HTTP status
    pub fail_status: Option<u16>,
    pub queries: RefCell<Vec<StacQuery>>,
}

impl FakeCatalog {
    pub fn with_stac(ids: &[&str]) -> Self {
        Self {
            stac_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_path_row(ids: &[&str]) -> Self {
        Self {
            path_row_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn check(&self) -> CbersResult<()> {
        match self.fail_status {
            Some(status) => Err(CbersError::Catalog {
                status,
                body: "Internal Server Error".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl CatalogTransport for FakeCatalog {
    fn list_path_row(&self, _sensor: Sensor, _path: u32, _row: u32) -> CbersResult<Vec<String>> {
        self.check()?;
        Ok(self.path_row_ids.clone())
    }

    fn stac_search(&self, query: &StacQuery) -> CbersResult<Vec<String>> {
        self.check()?;
        self.queries.borrow_mut().push(query.clone());
        Ok(self.stac_ids.clone())
    }
}

/// Raster reader synthesizing windows from the locator, counting reads
#[derive(Default)]
pub struct FakeRaster {
    pub reads: Cell<usize>,
    pub locators: RefCell<Vec<String>>,
    /// Locators containing this text fail as unreachable
    pub missing: Option<String>,
}

/// Deterministic content: a gradient offset by the band number, with a
/// zero (background) first column
pub fn synthetic_band(band_seed: u8, width: usize, height: usize) -> BandMatrix {
    Array2::from_shape_fn((height, width), |(r, c)| {
        if c == 0 {
            0
        } else {
            ((r * 7 + c * 3 + band_seed as usize * 11) % 200 + 20) as u8
        }
    })
}

impl RasterReader for FakeRaster {
    fn read_window(
        &self,
        locator: &str,
        _epsg: u32,
        _bounds: &Bounds,
        width: usize,
        height: usize,
    ) -> CbersResult<BandMatrix> {
        self.reads.set(self.reads.get() + 1);
        self.locators.borrow_mut().push(locator.to_string());

        if let Some(missing) = &self.missing {
            if locator.contains(missing.as_str()) {
                return Err(CbersError::Raster(format!("Failed to open {}", locator)));
            }
        }

        let seed = locator
            .trim_end_matches(".tif")
            .rsplit("_BAND")
            .next()
            .and_then(|b| b.parse::<u8>().ok())
            .unwrap_or(1);
        Ok(synthetic_band(seed, width, height))
    }
}
