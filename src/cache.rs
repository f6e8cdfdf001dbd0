//! On-disk side of the frame cache: identities, file layout and the image codec seam.

pub mod identity;
pub mod image_io;
pub mod path;
