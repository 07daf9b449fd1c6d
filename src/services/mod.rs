mod detector;
mod remote_source;
mod store;

pub use detector::{mime_for, Detector, HttpDetector};
pub use remote_source::{filename_from_id, GatewayClient, ImageSource};
pub use store::{ImageOrigin, ImageRecord, ImageStore, MemoryImageStore};
