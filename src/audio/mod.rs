//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod playback;
pub mod wav;

pub use buffer::JitterBuffer;
pub use device::list_output_devices;
pub use playback::{AudioOutput, AudioPlayback, HeadlessOutput};
pub use wav::{SampleSink, WavRecorder};
