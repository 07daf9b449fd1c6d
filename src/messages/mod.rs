pub mod control;
pub mod images;
pub mod stream;

pub use control::*;
pub use images::*;
pub use stream::*;
