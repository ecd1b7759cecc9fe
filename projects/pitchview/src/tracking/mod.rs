pub mod calibration;
pub mod export;
pub mod homography;
