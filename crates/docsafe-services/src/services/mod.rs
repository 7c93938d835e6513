#[cfg(feature = "clamav")]
pub mod clamav;

#[cfg(feature = "clamav")]
pub use clamav::ClamAVService;
