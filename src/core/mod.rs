//! Frame acquisition and normalization

pub mod aoi;
pub mod composite;
pub mod extract;
pub mod pipeline;
pub mod scene;
pub mod stretch;

// Re-export main types
pub use aoi::{build_aoi, lonlat_to_mercator, mercator_to_lonlat};
pub use composite::{frame_label, FrameCompositor, LabelFont};
pub use extract::{band_locator, BandExtractor};
pub use pipeline::{parse_band_list, parse_percentiles, select_scenes, GifPipeline, GifRequest, PipelineOutcome};
pub use scene::{dedup_by_date, parse_scene_id, SceneCatalog, SceneFilter, SearchMode, SearchRequest};
pub use stretch::{StretchMode, Stretcher};
