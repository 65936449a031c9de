pub mod json_region_sink;
pub mod rectangle_annotator;
