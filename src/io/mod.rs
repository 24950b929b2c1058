//! External capabilities: catalog, rasters, frame cache and GIF output

pub mod animation;
pub mod cache;
pub mod catalog;
pub mod raster;

pub use animation::AnimationAssembler;
pub use cache::{CacheKey, FrameCache};
pub use catalog::{CatalogTransport, HttpCatalog, StacQuery};
pub use raster::{GdalRasterReader, RasterReader};
