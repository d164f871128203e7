pub mod haar;
#[cfg(feature = "detect-opencv")]
pub mod opencv_haar;
pub mod stub;

pub use haar::HaarDetector;
#[cfg(feature = "detect-opencv")]
pub use opencv_haar::OpenCvHaarDetector;
pub use stub::StubDetector;
