mod backend;
mod backends;
mod cascade;
mod lazy;

pub use backend::{DetectionParams, FaceDetector};
pub use backends::{HaarDetector, StubDetector};
#[cfg(feature = "detect-opencv")]
pub use backends::OpenCvHaarDetector;
pub use cascade::HaarCascade;
pub use lazy::LazyDetector;
