pub mod capture_buffer;
pub mod format_adapter;
pub mod wav_codec;
pub mod wav_format;
