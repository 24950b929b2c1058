//! cbersgif: animated GIFs from CBERS-4 scenes
//!
//! Given a point, a buffer and three bands, this library discovers the
//! matching scenes, extracts and reprojects the window around the point for
//! every scene, normalizes the bands with a percentile stretch and writes the
//! labelled RGB frames as one animated GIF.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use types::{
    AreaOfInterest, BandMatrix, Bounds, CbersError, CbersResult, Frame, LevelFilter,
    SceneDescriptor, Sensor, StretchParameters,
};

pub use crate::core::{GifPipeline, GifRequest, PipelineOutcome, SearchMode};
pub use io::{AnimationAssembler, CatalogTransport, FrameCache, RasterReader};
