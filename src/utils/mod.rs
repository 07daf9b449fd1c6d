pub mod archive;
pub mod detection_utils;
pub mod geo;
pub mod image_utils;
pub mod staging;
