pub mod aggregator;
pub mod alert_log;
pub mod capture;
pub mod detection;
pub mod frame_sampler;
pub mod local_detector;
pub mod remote_detector;
pub mod sample_buffer;
pub mod sink;
pub mod utils;
