//! Device boundary: camera still-frame capture, geolocation, and speech I/O.

pub mod capture;
pub mod location;
pub mod speech;
pub mod stt;
pub mod tts_stream;
